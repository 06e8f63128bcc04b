//! VCS discovery: populate the root [`TemplateContext`]'s version
//! metadata from a local git checkout. Pure-Rust via `gix`, so forgecast
//! never shells out to `git` just to read a commit hash.

use camino::Utf8Path;

use crate::errors::{ForgecastError, Result};

/// The subset of repository state the template context needs.
#[derive(Debug, Clone)]
pub struct VcsInfo {
    pub commit: String,
    pub short_commit: String,
    pub commit_date: String,
    pub commit_timestamp: i64,
    pub branch: String,
    pub tag: Option<String>,
    pub previous_tag: Option<String>,
    pub summary: String,
    pub git_url: Option<String>,
}

/// Discover [`VcsInfo`] from the repository at `root`.
pub fn discover(root: &Utf8Path) -> Result<VcsInfo> {
    let repo = gix::discover(root.as_std_path()).map_err(|e| ForgecastError::Config { message: format!("not a git repository: {e}") })?;

    let head_commit = repo
        .head_commit()
        .map_err(|e| ForgecastError::Config { message: format!("could not resolve HEAD commit: {e}") })?;
    let commit = head_commit.id.to_string();
    let short_commit = commit.chars().take(8).collect();

    let time = head_commit
        .time()
        .map_err(|e| ForgecastError::Config { message: format!("could not read commit time: {e}") })?;
    let commit_timestamp = time.seconds;
    let commit_date = format_unix_date(commit_timestamp);

    let summary = head_commit
        .message()
        .map(|m| m.summary().to_string())
        .unwrap_or_default();

    let branch = repo
        .head_name()
        .ok()
        .flatten()
        .map(|name| name.shorten().to_string())
        .unwrap_or_else(|| "HEAD".to_owned());

    let (tag, previous_tag) = find_tags(&repo, &commit);

    let git_url = repo
        .find_remote("origin")
        .ok()
        .and_then(|remote| remote.url(gix::remote::Direction::Fetch).map(|u| u.to_bstring().to_string()));

    Ok(VcsInfo { commit, short_commit, commit_date, commit_timestamp, branch, tag, previous_tag, summary, git_url })
}

/// Walk annotated/lightweight tags reachable from `HEAD`, returning the
/// tag that points at `head_commit` (if any) and the next-most-recent
/// one before it, in reference-name sort order as a deterministic
/// approximation of "most recent" absent a full merge-base walk.
fn find_tags(repo: &gix::Repository, head_commit: &str) -> (Option<String>, Option<String>) {
    let Ok(references) = repo.references() else { return (None, None) };
    let Ok(tags) = references.tags() else { return (None, None) };

    let mut names: Vec<String> = tags
        .filter_map(|r| r.ok())
        .map(|r| r.name().shorten().to_string())
        .collect();
    names.sort();

    let mut current = None;
    let mut previous = None;
    for (i, name) in names.iter().enumerate() {
        if let Ok(reference) = repo.find_reference(&format!("refs/tags/{name}")) {
            if let Ok(id) = reference.into_fully_peeled_id() {
                if id.to_string() == head_commit {
                    current = Some(name.clone());
                    previous = i.checked_sub(1).and_then(|j| names.get(j).cloned());
                    break;
                }
            }
        }
    }
    (current, previous)
}

fn format_unix_date(unix_seconds: i64) -> String {
    time::OffsetDateTime::from_unix_timestamp(unix_seconds)
        .ok()
        .and_then(|t| {
            let format = time::format_description::well_known::Rfc3339;
            t.format(&format).ok()
        })
        .unwrap_or_default()
}
