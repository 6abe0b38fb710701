//! Argument helpers shared by the controller and the route layer.

use crate::error::ControllerError;
use crate::model::{ArgValue, Arguments, QueryError, QueryErrorKind, VisSpec};

/// Check `args` against the variables declared by `vis`.
///
/// Returns a single `vis` error describing every problem found, or `None` when the
/// arguments can be executed.
pub fn validate_args(vis: &VisSpec, args: &Arguments) -> Option<QueryError> {
    let mut missing = Vec::new();
    let mut invalid = Vec::new();

    for variable in &vis.variables {
        match args.get(&variable.name) {
            None => {
                if variable.default_value.is_none() {
                    missing.push(variable.name.as_str());
                }
            }
            Some(value) => {
                if variable.valid_values.is_empty() {
                    continue;
                }
                for v in value.as_strings() {
                    if !variable.valid_values.iter().any(|allowed| allowed == v) {
                        invalid.push(format!(
                            "'{v}' is not a valid value for '{}' (expected one of: {})",
                            variable.name,
                            variable.valid_values.join(", ")
                        ));
                    }
                }
            }
        }
    }

    if missing.is_empty() && invalid.is_empty() {
        return None;
    }

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing required arguments: {}", missing.join(", ")));
    }
    parts.extend(invalid);
    Some(QueryError::new(QueryErrorKind::Vis, parts.join("; ")))
}

/// Canonical JSON form used only to detect whether two argument sets are equivalent.
///
/// `Arguments` is key-ordered, so equal sets always encode identically.
pub fn stable_serialize_args(args: &Arguments) -> String {
    serde_json::to_string(args).unwrap_or_default()
}

/// Restrict `args` to the variables `vis` declares, filling in defaults for missing ones.
pub fn args_for_vis(vis: &VisSpec, args: &Arguments) -> Arguments {
    let mut out = Arguments::new();
    for variable in &vis.variables {
        if let Some(value) = args.get(&variable.name) {
            out.insert(variable.name.clone(), value.clone());
        } else if let Some(default) = variable.default_value.as_ref() {
            out.insert(variable.name.clone(), ArgValue::Single(default.clone()));
        }
    }
    out
}

/// Parse `name=value` pairs; repeated names collect into a list.
pub fn parse_arg_pairs<'a>(
    pairs: impl IntoIterator<Item = &'a str>,
) -> Result<Arguments, ControllerError> {
    let mut out = Arguments::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| ControllerError::InvalidArgument(pair.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ControllerError::InvalidArgument(pair.to_string()));
        }
        let value = value.to_string();
        match out.remove(name) {
            None => {
                out.insert(name.to_string(), ArgValue::Single(value));
            }
            Some(ArgValue::Single(prev)) => {
                out.insert(name.to_string(), ArgValue::List(vec![prev, value]));
            }
            Some(ArgValue::List(mut prev)) => {
                prev.push(value);
                out.insert(name.to_string(), ArgValue::List(prev));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VisVariable;

    fn variable(name: &str, default: Option<&str>, valid: &[&str]) -> VisVariable {
        VisVariable {
            name: name.to_string(),
            default_value: default.map(str::to_string),
            valid_values: valid.iter().map(|v| v.to_string()).collect(),
            description: None,
        }
    }

    fn vis() -> VisSpec {
        VisSpec {
            variables: vec![
                variable("start_time", Some("-5m"), &[]),
                variable("namespace", None, &[]),
                variable("protocol", Some("http"), &["http", "grpc"]),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn missing_required_argument_is_reported() {
        let err = validate_args(&vis(), &Arguments::new()).unwrap();
        assert_eq!(err.kind, Some(QueryErrorKind::Vis));
        assert!(err.message.contains("namespace"));
        assert!(!err.message.contains("start_time"));
    }

    #[test]
    fn value_outside_valid_values_is_reported() {
        let args = parse_arg_pairs(["namespace=default", "protocol=dns"]).unwrap();
        let err = validate_args(&vis(), &args).unwrap();
        assert!(err.message.contains("'dns'"));
    }

    #[test]
    fn valid_arguments_pass() {
        let args = parse_arg_pairs(["namespace=default", "protocol=grpc"]).unwrap();
        assert!(validate_args(&vis(), &args).is_none());
        assert!(validate_args(&VisSpec::default(), &Arguments::new()).is_none());
    }

    #[test]
    fn serialization_ignores_insertion_order() {
        let a = parse_arg_pairs(["b=2", "a=1"]).unwrap();
        let b = parse_arg_pairs(["a=1", "b=2"]).unwrap();
        assert_eq!(stable_serialize_args(&a), stable_serialize_args(&b));
    }

    #[test]
    fn serialization_is_canonical_json() {
        let args = parse_arg_pairs(["pod=b", "ns=px", "pod=a"]).unwrap();
        assert_eq!(stable_serialize_args(&args), r#"{"ns":"px","pod":["b","a"]}"#);
    }

    #[test]
    fn malformed_pairs_are_rejected() {
        assert!(matches!(
            parse_arg_pairs(["namespace"]),
            Err(ControllerError::InvalidArgument(p)) if p == "namespace"
        ));
        assert!(matches!(
            parse_arg_pairs([" =x"]),
            Err(ControllerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn serialization_distinguishes_lists_from_scalars() {
        let mut single = Arguments::new();
        single.insert("a".into(), ArgValue::Single("x,y".into()));
        let mut list = Arguments::new();
        list.insert("a".into(), ArgValue::List(vec!["x".into(), "y".into()]));
        assert_ne!(stable_serialize_args(&single), stable_serialize_args(&list));
    }

    #[test]
    fn args_for_vis_fills_defaults_and_drops_unknown() {
        let args = parse_arg_pairs(["namespace=px", "stray=1"]).unwrap();
        let out = args_for_vis(&vis(), &args);
        assert_eq!(out.get("namespace"), Some(&ArgValue::from("px")));
        assert_eq!(out.get("start_time"), Some(&ArgValue::from("-5m")));
        assert_eq!(out.get("protocol"), Some(&ArgValue::from("http")));
        assert!(!out.contains_key("stray"));
    }

    #[test]
    fn repeated_pairs_collect_into_list() {
        let args = parse_arg_pairs(["pod=a", "pod=b", "pod=c"]).unwrap();
        assert_eq!(
            args.get("pod"),
            Some(&ArgValue::List(vec!["a".into(), "b".into(), "c".into()]))
        );
        assert!(parse_arg_pairs(["novalue"]).is_err());
    }
}
