//! Parsing and guarding of free-form kubectl argument strings.
//!
//! The generic `kubectl` tool accepts a command line from the model. It is
//! split without a shell, then checked for its verb, disallowed namespaces
//! and restricted resources before anything runs.

use crate::config::KubectlConfig;

/// The only verbs the `kubectl` tool runs.
pub const READ_VERBS: &[&str] = &[
    "get",
    "describe",
    "logs",
    "top",
    "events",
    "explain",
    "api-resources",
    "api-versions",
    "version",
    "cluster-info",
];

/// Refused anywhere in the argument list, even after a read verb.
pub const MUTATING_VERBS: &[&str] = &["delete", "exec", "edit", "patch", "replace", "scale"];

/// Global flags whose value is the following argument.
const VALUE_FLAGS: &[&str] = &["-n", "--namespace", "-o", "--output", "-l", "--selector", "-c", "--container"];

/// Split `line` into arguments, honouring single and double quotes and
/// backslash escapes outside single quotes. No shell expansion happens.
///
/// Returns `Err` for an unterminated quote.
pub fn split_command(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') | (Some('"'), '"') => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_token = true;
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("unterminated {q} quote"));
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}

/// The namespace named by `-n`/`--namespace`, if any.
///
/// `Err` when the flag has no value.
pub fn namespace_flag(args: &[String]) -> Result<Option<&str>, String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--namespace=") {
            return Ok(Some(value));
        }
        if arg == "-n" || arg == "--namespace" {
            return iter
                .next()
                .map(|v| Some(v.as_str()))
                .ok_or_else(|| "namespace flag without value".to_string());
        }
    }
    Ok(None)
}

/// The first positional argument, skipping flags and their values.
pub fn verb(args: &[String]) -> Option<&str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with('-') {
            return Some(arg);
        }
    }
    None
}

pub fn has_output_flag(args: &[String]) -> bool {
    args.iter()
        .any(|a| a == "-o" || a == "--output" || a.starts_with("-o=") || a.starts_with("--output="))
}

/// Check a parsed argument list against the read-only policy.
///
/// Returns the first violation found.
pub fn check_read_only(args: &[String], config: &KubectlConfig) -> Result<(), String> {
    if args.is_empty() {
        return Err("empty command".to_string());
    }

    match verb(args) {
        Some(v) if READ_VERBS.contains(&v) => {}
        Some(v) => return Err(format!("'{v}' is not a read-only kubectl command")),
        None => return Err("command has no kubectl verb".to_string()),
    }

    if let Some(verb) = args.iter().find(|a| MUTATING_VERBS.contains(&a.as_str())) {
        return Err(format!("command contains mutating operation '{verb}'"));
    }

    if let Some(ns) = namespace_flag(args)? {
        if !config.namespace_allowed(ns) {
            return Err(format!(
                "namespace '{ns}' is not in allowed namespaces: {:?}",
                config.allowed_namespaces
            ));
        }
    }

    if !config.all_namespaces_allowed()
        && args.iter().any(|a| a == "-A" || a == "--all-namespaces")
    {
        return Err("querying all namespaces is not allowed".to_string());
    }

    if args.iter().any(|a| a == "--context" || a.starts_with("--context=") || a == "--kubeconfig" || a.starts_with("--kubeconfig=")) {
        return Err("overriding the cluster context is not allowed".to_string());
    }

    if let Some(resource) = args.iter().find(|a| !a.starts_with('-') && config.is_restricted(a)) {
        return Err(format!("access to resource '{resource}' is restricted"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        split_command(line).unwrap()
    }

    #[test]
    fn splitting_honours_quotes() {
        assert_eq!(
            args(r#"get pods -l 'app in (web, api)' --field-selector "status.phase!=Running""#),
            vec![
                "get",
                "pods",
                "-l",
                "app in (web, api)",
                "--field-selector",
                "status.phase!=Running"
            ]
        );
        assert_eq!(args("  get   nodes "), vec!["get", "nodes"]);
        assert_eq!(args(r"get pod my\ pod"), vec!["get", "pod", "my pod"]);
        assert!(split_command("get 'pods").is_err());
    }

    #[test]
    fn mutating_verbs_are_refused() {
        let config = KubectlConfig::default();
        for line in ["delete pod web-1", "get pods && exec web-1", "scale deploy/web --replicas=0"] {
            assert!(check_read_only(&args(line), &config).is_err(), "{line}");
        }
        assert!(check_read_only(&args("get pods -l app=deleter"), &config).is_ok());
    }

    #[test]
    fn only_read_verbs_run() {
        let config = KubectlConfig::default();
        for line in [
            "apply -f web.yaml",
            "create deployment web --image=nginx",
            "drain node-2",
            "cordon node-2",
            "label pod web-1 tier=db",
            "rollout restart deploy/web",
            "set image deploy/web web=nginx:2",
            "-n default annotate pod web-1 a=b",
            "-o json",
        ] {
            assert!(check_read_only(&args(line), &config).is_err(), "{line}");
        }
        for line in ["-n default get pods", "top pods", "logs web-1 --tail=5", "version"] {
            assert!(check_read_only(&args(line), &config).is_ok(), "{line}");
        }
    }

    #[test]
    fn namespaces_are_checked_in_every_flag_form() {
        let config = KubectlConfig::default();
        assert!(check_read_only(&args("get pods -n default"), &config).is_ok());
        assert!(check_read_only(&args("get pods -n kube-system"), &config).is_err());
        assert!(check_read_only(&args("get pods --namespace=kube-system"), &config).is_err());
        assert!(check_read_only(&args("get pods -n"), &config).is_err());
        assert!(check_read_only(&args("get pods -A"), &config).is_err());

        let open = KubectlConfig {
            allowed_namespaces: vec!["*".to_string()],
            ..KubectlConfig::default()
        };
        assert!(check_read_only(&args("get pods -n kube-system"), &open).is_ok());
        assert!(check_read_only(&args("get pods --all-namespaces"), &open).is_ok());
    }

    #[test]
    fn restricted_resources_are_refused_in_any_spelling() {
        let config = KubectlConfig::default();
        for line in ["get secrets", "get secret/db-password -o yaml", "get pods,secrets"] {
            assert!(check_read_only(&args(line), &config).is_err(), "{line}");
        }
    }

    #[test]
    fn context_override_is_refused() {
        let config = KubectlConfig::default();
        assert!(check_read_only(&args("get pods --context prod"), &config).is_err());
    }

    #[test]
    fn output_flag_detection() {
        assert!(has_output_flag(&args("get pods -o wide")));
        assert!(has_output_flag(&args("get pods --output=json")));
        assert!(!has_output_flag(&args("get pods")));
    }
}
