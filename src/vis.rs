//! Derive the function calls sent with a script from its visualization spec.

use crate::model::{Arguments, Func, QueryFunction, VisSpec};

/// Resolve the global and widget functions of `vis` against `args`.
///
/// When `widget` names an embedded widget, only that widget's function and the
/// global function it reads from are returned.
pub fn query_funcs(vis: &VisSpec, args: &Arguments, widget: Option<&str>) -> Vec<QueryFunction> {
    let mut funcs = Vec::new();

    let selected_global = widget.and_then(|name| {
        vis.widgets
            .iter()
            .find(|w| w.name.as_deref() == Some(name))
            .and_then(|w| w.global_func_output_name.as_deref())
    });

    for global in &vis.global_funcs {
        if widget.is_some() && selected_global != Some(global.output_name.as_str()) {
            continue;
        }
        funcs.push(resolve(&global.output_name, &global.func, args));
    }

    for (i, w) in vis.widgets.iter().enumerate() {
        let Some(func) = w.func.as_ref() else {
            continue;
        };
        if let Some(name) = widget {
            if w.name.as_deref() != Some(name) {
                continue;
            }
        }
        let prefix = w.name.clone().unwrap_or_else(|| format!("widget_{i}"));
        funcs.push(resolve(&prefix, func, args));
    }

    funcs
}

fn resolve(prefix: &str, func: &Func, args: &Arguments) -> QueryFunction {
    let resolved = func
        .args
        .iter()
        .map(|arg| {
            let value = match (&arg.variable, &arg.value) {
                (Some(variable), _) => args
                    .get(variable)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                (None, Some(value)) => value.clone(),
                (None, None) => String::new(),
            };
            (arg.name.clone(), value)
        })
        .collect();
    QueryFunction {
        output_table_prefix: prefix.to_string(),
        func_name: func.name.clone(),
        args: resolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArgValue, FuncArg, GlobalFunc, Widget};

    fn func(name: &str, var: &str) -> Func {
        Func {
            name: name.to_string(),
            args: vec![
                FuncArg {
                    name: "start".into(),
                    value: None,
                    variable: Some(var.into()),
                },
                FuncArg {
                    name: "limit".into(),
                    value: Some("100".into()),
                    variable: None,
                },
            ],
        }
    }

    fn spec() -> VisSpec {
        VisSpec {
            variables: Vec::new(),
            global_funcs: vec![GlobalFunc {
                output_name: "shared".into(),
                func: func("shared_fn", "start_time"),
            }],
            widgets: vec![
                Widget {
                    name: Some("latency".into()),
                    func: Some(func("latency_fn", "start_time")),
                    global_func_output_name: None,
                },
                Widget {
                    name: Some("map".into()),
                    func: None,
                    global_func_output_name: Some("shared".into()),
                },
                Widget {
                    name: None,
                    func: Some(func("anon_fn", "start_time")),
                    global_func_output_name: None,
                },
            ],
        }
    }

    #[test]
    fn resolves_variables_and_literals() {
        let mut args = Arguments::new();
        args.insert("start_time".into(), ArgValue::from("-5m"));
        let funcs = query_funcs(&spec(), &args, None);
        assert_eq!(funcs.len(), 3);
        assert_eq!(funcs[0].output_table_prefix, "shared");
        assert_eq!(
            funcs[1].args,
            vec![("start".into(), "-5m".into()), ("limit".into(), "100".into())]
        );
        assert_eq!(funcs[2].output_table_prefix, "widget_2");
    }

    #[test]
    fn embedded_widget_limits_functions() {
        let args = Arguments::new();
        let funcs = query_funcs(&spec(), &args, Some("map"));
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].func_name, "shared_fn");

        let funcs = query_funcs(&spec(), &args, Some("latency"));
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].func_name, "latency_fn");
    }
}
