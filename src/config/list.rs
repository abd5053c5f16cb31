use anyhow::Result;
use serde_json::{Map, Value};

use crate::args::BaseArgs;

type Fields = Vec<(&'static str, String)>;

pub fn run(base: BaseArgs, global: bool, local: bool, verbose: bool) -> Result<()> {
    if verbose {
        run_verbose(base, global, local)
    } else {
        run_resolved(base, global, local)
    }
}

fn run_resolved(base: BaseArgs, global: bool, local: bool) -> Result<()> {
    let config = if global {
        super::load_global()?
    } else if local {
        super::local_path()
            .map(|p| super::load_file(&p))
            .unwrap_or_default()
    } else {
        super::load()?
    };

    let output = format_resolved(&config.non_empty_fields(), base.json)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn format_resolved(fields: &Fields, json: bool) -> Result<String> {
    if json {
        let map: Map<String, Value> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), json_value(v)))
            .collect();
        Ok(serde_json::to_string(&map)?)
    } else {
        Ok(fields
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

fn run_verbose(base: BaseArgs, global: bool, local: bool) -> Result<()> {
    let mut sources: Vec<(String, Fields)> = Vec::new();

    if !local {
        if let Ok(path) = super::global_path() {
            let fields = super::load_file(&path).non_empty_fields();
            if !fields.is_empty() {
                sources.push((path.display().to_string(), fields));
            }
        }
    }
    if !global {
        if let Some(path) = super::local_path() {
            let fields = super::load_file(&path).non_empty_fields();
            if !fields.is_empty() {
                sources.push((path.display().to_string(), fields));
            }
        }
    }

    let output = format_verbose(&sources, base.json)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn format_verbose(sources: &[(String, Fields)], json: bool) -> Result<String> {
    if json {
        let mut map = Map::new();
        for (path, fields) in sources {
            let o: Map<String, Value> = fields
                .iter()
                .map(|(k, v)| (k.to_string(), json_value(v)))
                .collect();
            map.insert(path.clone(), Value::Object(o));
        }
        Ok(serde_json::to_string(&map)?)
    } else {
        let mut parts = Vec::new();
        for (path, fields) in sources {
            let mut group = path.clone();
            for (key, value) in fields {
                group.push_str(&format!("\n  {key}: {value}"));
            }
            parts.push(group);
        }
        Ok(parts.join("\n\n"))
    }
}

/// Numeric settings print as JSON numbers, everything else as strings.
fn json_value(value: &str) -> Value {
    value
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn sample() -> Config {
        Config {
            api_url: Some("https://db.example.com".into()),
            batch_size: Some(250),
            ..Default::default()
        }
    }

    #[test]
    fn resolved_text_lists_set_keys_in_order() {
        let out = format_resolved(&sample().non_empty_fields(), false).unwrap();
        assert_eq!(out, "api_url: https://db.example.com\nbatch_size: 250");
    }

    #[test]
    fn resolved_text_empty_config() {
        let out = format_resolved(&Config::default().non_empty_fields(), false).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn resolved_json_uses_numbers_for_counts() {
        let out = format_resolved(&sample().non_empty_fields(), true).unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["api_url"], "https://db.example.com");
        assert_eq!(parsed["batch_size"], 250);
    }

    #[test]
    fn verbose_text_groups_by_source() {
        let sources: Vec<(String, Fields)> = vec![
            (
                "~/.config/crm-batch/config.json".into(),
                vec![("api_url", "https://db.example.com".into())],
            ),
            (
                ".crm-batch/config.json".into(),
                vec![("delay_ms", "0".into())],
            ),
        ];
        let out = format_verbose(&sources, false).unwrap();
        assert_eq!(
            out,
            "~/.config/crm-batch/config.json\n  api_url: https://db.example.com\n\n.crm-batch/config.json\n  delay_ms: 0"
        );
    }

    #[test]
    fn verbose_json_nested_by_path() {
        let sources: Vec<(String, Fields)> = vec![(
            ".crm-batch/config.json".into(),
            vec![("state_dir", "/var/runs".into())],
        )];
        let out = format_verbose(&sources, true).unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[".crm-batch/config.json"]["state_dir"], "/var/runs");
    }

    #[test]
    fn verbose_json_empty() {
        assert_eq!(format_verbose(&[], true).unwrap(), "{}");
    }
}
