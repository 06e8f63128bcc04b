//! Validation rules applied to a parsed [`super::Config`] before any
//! stage runs: non-empty project name, unique (auto-filled) build ids,
//! and that every `{{ ... }}`-shaped template string actually parses.

use std::collections::BTreeSet;
use std::fmt;

use super::Config;
use crate::build;
use crate::template::preprocess;

/// A configuration validation failure. Carries a plain message rather
/// than a structured variant set; callers treat every validation
/// problem as one `ConfigError` kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

/// Validate and normalize `config` in place: fills missing build ids,
/// checks for duplicates, and checks every template-ish string for
/// syntactic validity (not runtime success, since that depends on
/// bindings only known at render time).
pub fn validate(config: &mut Config) -> Result<(), ValidationError> {
    if config.project_name.trim().is_empty() {
        return Err(ValidationError("projectName is required and must be non-empty".into()));
    }

    build::assign_missing_ids(&mut config.builds);
    let mut seen = BTreeSet::new();
    for spec in &config.builds {
        if !seen.insert(spec.id.clone()) {
            return Err(ValidationError(format!("duplicate build id {:?}", spec.id)));
        }
    }

    config.checksum.algorithm()?;

    for template in collect_templates(config) {
        check_template_parses(&template)?;
    }

    Ok(())
}

fn collect_templates(config: &Config) -> Vec<String> {
    let mut templates = Vec::new();
    for build in &config.builds {
        templates.push(build.binary_name.clone());
        templates.push(build.command.clone());
        templates.extend(build.env.values().cloned());
    }
    for archive in &config.archives {
        templates.push(archive.name_template.clone());
    }
    for release in &config.release {
        templates.push(release.api_base.clone());
        templates.push(release.repo.clone());
    }
    for announce in &config.announce {
        templates.push(announce.message_template.clone());
    }
    templates
}

/// A string "parses" as a template when every `{{` has a matching `}}`;
/// this is a cheap syntactic check, not a render, since binding
/// resolution failures are reported at render time instead (a template
/// referencing an as-yet-undeclared user variable is not a config error).
fn check_template_parses(source: &str) -> Result<(), ValidationError> {
    let rewritten = preprocess::rewrite(source);
    let opens = rewritten.matches("{{").count();
    let closes = rewritten.matches("}}").count();
    if opens != closes {
        return Err(ValidationError(format!("unbalanced template braces in {source:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::WebhookConfig;
    use crate::build::{BuildSpec, Target};
    use std::collections::BTreeMap;

    fn minimal_config() -> Config {
        Config {
            project_name: "demo".into(),
            dist: "dist".into(),
            variables: BTreeMap::new(),
            builds: Vec::new(),
            archives: Vec::new(),
            nfpms: Vec::new(),
            dockers: Vec::new(),
            checksum: Default::default(),
            release: Vec::new(),
            blob_stores: Vec::new(),
            announce: Vec::new(),
            homepage: String::new(),
            description: String::new(),
            license: String::new(),
            maintainer: String::new(),
            vendor: String::new(),
        }
    }

    #[test]
    fn empty_project_name_is_rejected() {
        let mut config = minimal_config();
        config.project_name = "  ".into();
        assert!(validate(&mut config).is_err());
    }

    #[test]
    fn missing_build_ids_are_auto_filled_and_checked_for_uniqueness() {
        let mut config = minimal_config();
        config.builds = vec![
            BuildSpec {
                id: String::new(),
                builder: "prebuilt".into(),
                command: "echo".into(),
                binary_name: "demo".into(),
                targets: vec![Target { goos: "linux".into(), goarch: "amd64".into(), goarm: None, goamd64: None }],
                goos: Vec::new(),
                goarch: Vec::new(),
                goarm: Vec::new(),
                goamd64: Vec::new(),
                ignore: Vec::new(),
                env: BTreeMap::new(),
                cgo_enabled: false,
                cross_compilers: BTreeMap::new(),
                before: Vec::new(),
                after: Vec::new(),
            },
        ];
        validate(&mut config).unwrap();
        assert_eq!(config.builds[0].id, "build0");
    }

    #[test]
    fn unbalanced_braces_in_a_template_string_are_rejected() {
        let mut config = minimal_config();
        config.announce.push(WebhookConfig {
            name: "slack".into(),
            url_env: "SLACK_WEBHOOK_URL".into(),
            message_template: "{{ ProjectName released".into(),
            skip: false,
        });
        assert!(validate(&mut config).is_err());
    }
}
