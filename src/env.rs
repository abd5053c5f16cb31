use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const ENV_FILE_FLAG: &str = "--env-file";

/// Loads `.env` files before clap parses arguments, so that `env = "CRM_*"`
/// fallbacks can see their values.
pub fn bootstrap_from_args(args: &[OsString]) -> Result<()> {
    let explicit_env_file = extract_env_file_arg(args);
    load_env(explicit_env_file.as_ref())
}

pub fn load_env(explicit_env_file: Option<&PathBuf>) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let stage = std::env::var("CRM_ENV").unwrap_or_else(|_| "development".to_string());
    let env_files = resolve_env_files(&cwd, &stage, explicit_env_file);

    let mut loaded = HashMap::new();
    for env_file in env_files {
        if !env_file.exists() && explicit_env_file.is_none() {
            continue;
        }

        let parsed = dotenvy::from_path_iter(&env_file)
            .with_context(|| format!("failed to read env file {}", env_file.display()))?;
        for item in parsed {
            let (key, value) =
                item.with_context(|| format!("failed to parse env file {}", env_file.display()))?;
            // The real environment always wins over any file.
            if std::env::var_os(&key).is_some() {
                continue;
            }
            // Later files have higher precedence.
            loaded.insert(key, value);
        }
    }

    let mut envs: Vec<(String, String)> = loaded.into_iter().collect();
    envs.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, value) in envs {
        std::env::set_var(key, value);
    }
    Ok(())
}

fn extract_env_file_arg(args: &[OsString]) -> Option<PathBuf> {
    let mut explicit = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let Some(arg) = arg.to_str() else {
            continue;
        };
        if arg == "--" {
            break;
        }
        if arg == ENV_FILE_FLAG {
            if let Some(next) = iter.next() {
                explicit = Some(PathBuf::from(next));
            }
            continue;
        }
        if let Some(value) = arg
            .strip_prefix(ENV_FILE_FLAG)
            .and_then(|rest| rest.strip_prefix('='))
        {
            explicit = Some(PathBuf::from(value));
        }
    }
    explicit
}

fn resolve_env_files(cwd: &Path, stage: &str, explicit_env_file: Option<&PathBuf>) -> Vec<PathBuf> {
    if let Some(path) = explicit_env_file {
        return vec![if path.is_absolute() {
            path.clone()
        } else {
            cwd.join(path)
        }];
    }

    let mut files = vec![cwd.join(".env"), cwd.join(format!(".env.{stage}"))];
    if stage != "test" {
        files.push(cwd.join(".env.local"));
    }
    files.push(cwd.join(format!(".env.{stage}.local")));
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn env_file_flag_forms() {
        assert_eq!(
            extract_env_file_arg(&os_args(&["crm-batch", "--env-file", "prod.env", "status"])),
            Some(PathBuf::from("prod.env"))
        );
        assert_eq!(
            extract_env_file_arg(&os_args(&["crm-batch", "status", "--env-file=.env.ci"])),
            Some(PathBuf::from(".env.ci"))
        );
        assert_eq!(
            extract_env_file_arg(&os_args(&["crm-batch", "--", "--env-file", "x"])),
            None
        );
        assert_eq!(
            extract_env_file_arg(&os_args(&["crm-batch", "--env-filex"])),
            None
        );
    }

    #[test]
    fn stage_files_in_precedence_order() {
        let cwd = Path::new("/work");
        let files = resolve_env_files(cwd, "staging", None);
        assert_eq!(
            files,
            vec![
                cwd.join(".env"),
                cwd.join(".env.staging"),
                cwd.join(".env.local"),
                cwd.join(".env.staging.local"),
            ]
        );
    }

    #[test]
    fn test_stage_skips_local_file() {
        let cwd = Path::new("/work");
        let files = resolve_env_files(cwd, "test", None);
        assert!(!files.contains(&cwd.join(".env.local")));
    }

    #[test]
    fn explicit_file_replaces_defaults() {
        let cwd = Path::new("/work");
        let explicit = PathBuf::from("conf/ci.env");
        assert_eq!(
            resolve_env_files(cwd, "development", Some(&explicit)),
            vec![cwd.join("conf/ci.env")]
        );
    }
}
