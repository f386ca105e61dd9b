use super::*;
use fxhash::FxHashMap;
use glob::glob;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::*;
use tracing::*;

type Vars = FxHashMap<String, String>;

#[derive(Error, Debug)]
pub enum BuildfileError {
    #[error("Could not open rule file {file:?}: {err:?}")]
    FileOpenError { file: PathBuf, err: std::io::Error },

    #[error("Unknown rule file format: {file:?} (expected .yaml, .yml or .toml)")]
    UnknownFormat { file: PathBuf },
}

/// A parsed rule file: the path it came from and the targets it defines.
///
/// Two line-oriented flavours are supported, chosen by extension. The
/// YAML-ish flavour has `variables:` / `config:` / `targets:` sections with
/// dash-item lists and `|`/`>` multiline commands; the TOML-ish flavour has
/// `[target.<name>]` sections with `key = value` pairs and inline `[a, b]`
/// lists. Commands in both flavours go through `${var}` / `${{expr}}`
/// expansion, where the expanded `inputs`, `outputs` and `dependencies`
/// variables are bound to the lists gathered so far.
///
#[derive(Debug, Default)]
pub struct Buildfile {
    pub file: PathBuf,
    pub targets: Vec<Target>,
}

impl Buildfile {
    #[tracing::instrument(name = "Buildfile::from_file")]
    pub fn from_file(file: &Path) -> Result<Buildfile, BuildfileError> {
        let extension = file.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        let targets = match extension {
            "yaml" | "yml" => Self::parse_yaml(file)?,
            "toml" => Self::parse_toml(file)?,
            _ => {
                return Err(BuildfileError::UnknownFormat {
                    file: file.to_path_buf(),
                })
            }
        };
        debug!("Parsed {} targets from {:?}", targets.len(), file);
        Ok(Buildfile {
            file: file.to_path_buf(),
            targets,
        })
    }

    fn read(file: &Path) -> Result<String, BuildfileError> {
        std::fs::read_to_string(file).map_err(|err| BuildfileError::FileOpenError {
            file: file.to_path_buf(),
            err,
        })
    }

    fn parse_yaml(file: &Path) -> Result<Vec<Target>, BuildfileError> {
        let contents = Self::read(file)?;

        let mut targets: Vec<Target> = vec![];
        let mut current = Target::default();
        let mut in_target = false;
        let mut current_list = String::new();
        let mut current_section = String::new();
        let mut reading_multiline = false;
        let mut multiline_indent = 0;
        let mut multiline_buffer = String::new();
        let mut vars = Vars::default();
        let mut cfg = Vars::default();

        for line in contents.lines() {
            if reading_multiline {
                let indent = line.find(|c: char| c != ' ' && c != '\t');
                match indent {
                    Some(indent) if indent >= multiline_indent => {
                        multiline_buffer.push_str(&line[multiline_indent..]);
                        multiline_buffer.push('\n');
                        continue;
                    }
                    _ => {
                        current.command =
                            expand_variables(&multiline_buffer, &list_vars(&vars, &current), &cfg);
                        reading_multiline = false;
                        multiline_buffer.clear();
                    }
                }
            }

            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let indent = match line.find(|c: char| c != ' ' && c != '\t') {
                Some(indent) => indent,
                None => continue,
            };
            let trimmed = &line[indent..];

            if indent == 0 {
                match trimmed {
                    "variables:" => {
                        current_section = "variables".to_string();
                        continue;
                    }
                    "config:" => {
                        current_section = "config".to_string();
                        continue;
                    }
                    "targets:" => {
                        current_section.clear();
                        continue;
                    }
                    _ => {}
                }
            }

            if !current_section.is_empty() {
                if let Some((key, value)) = trimmed.split_once(':') {
                    let value = trim_ws(value);
                    match current_section.as_str() {
                        "variables" => {
                            vars.insert(key.to_string(), value.to_string());
                        }
                        "config" => {
                            cfg.insert(key.to_string(), value.to_string());
                        }
                        _ => {}
                    }
                    continue;
                }
            }

            // A dash at indent 2 opens the next target entry.
            if indent == 2 && trimmed.starts_with('-') {
                if in_target && !current.name.is_empty() {
                    targets.push(std::mem::take(&mut current));
                } else {
                    current = Target::default();
                }
                current_list.clear();
                in_target = true;

                if let Some(pos) = trimmed.find("name:") {
                    current.name = trim_ws(&trimmed[pos + 5..]).to_string();
                }
                continue;
            }

            if !in_target {
                continue;
            }

            if let Some((key, value)) = trimmed.split_once(':') {
                let value = trim_ws(value);
                match key {
                    "name" => {
                        current.name = value.to_string();
                        current_list.clear();
                    }
                    "command" => {
                        if value == "|" || value == ">" {
                            reading_multiline = true;
                            multiline_indent = indent + 2;
                            multiline_buffer.clear();
                            continue;
                        }
                        current.command =
                            expand_variables(value, &list_vars(&vars, &current), &cfg);
                        current_list.clear();
                    }
                    "inputs" | "outputs" | "dependencies" => {
                        current_list = key.to_string();
                    }
                    _ => {}
                }
            } else if trimmed.starts_with('-') && !current_list.is_empty() {
                let item = trim_ws(&trimmed[1..]).to_string();
                match current_list.as_str() {
                    "inputs" => current.inputs.push(item),
                    "outputs" => current.outputs.push(item),
                    "dependencies" => current.deps.push(item),
                    _ => {}
                }
            }
        }

        if reading_multiline {
            current.command =
                expand_variables(&multiline_buffer, &list_vars(&vars, &current), &cfg);
        }
        if in_target && !current.name.is_empty() {
            targets.push(current);
        }

        Ok(targets)
    }

    fn parse_toml(file: &Path) -> Result<Vec<Target>, BuildfileError> {
        let contents = Self::read(file)?;

        let mut targets: Vec<Target> = vec![];
        let mut current = Target::default();
        let vars = Vars::default();
        let cfg = Vars::default();

        for raw_line in contents.lines() {
            if raw_line.is_empty() || raw_line.starts_with('#') {
                continue;
            }
            let line = trim_ws(raw_line);
            if line.is_empty() {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                if !current.name.is_empty() {
                    targets.push(std::mem::take(&mut current));
                } else {
                    current = Target::default();
                }
                let section = &line[1..line.len() - 1];
                if let Some(rest) = section.strip_prefix("target") {
                    if let Some(name) = rest.strip_prefix('.') {
                        current.name = name.to_string();
                    }
                }
                continue;
            }

            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key, value),
                None => continue,
            };
            let key = key.trim_end_matches([' ', '\t']);
            let value = trim_ws(value);
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);

            match key {
                "name" => current.name = value.to_string(),
                "command" => {
                    // The TOML flavour binds the raw lists, without globbing.
                    let mut merged = vars.clone();
                    merged.insert("inputs".to_string(), current.inputs.join(" "));
                    merged.insert("outputs".to_string(), current.outputs.join(" "));
                    merged.insert("dependencies".to_string(), current.deps.join(" "));
                    current.command = expand_variables(value, &merged, &cfg);
                }
                "inputs" | "outputs" | "dependencies" => {
                    if let Some(list) = value.strip_prefix('[') {
                        let list = list.split(']').next().unwrap_or(list);
                        for item in list.split(',') {
                            let item = item.trim_matches(|c| c == ' ' || c == '\t' || c == '"');
                            if item.is_empty() {
                                continue;
                            }
                            match key {
                                "inputs" => current.inputs.push(item.to_string()),
                                "outputs" => current.outputs.push(item.to_string()),
                                "dependencies" => current.deps.push(item.to_string()),
                                _ => {}
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if !current.name.is_empty() {
            targets.push(current);
        }

        Ok(targets)
    }
}

fn trim_ws(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '\t')
}

/// The substitution environment for a command line: the file's variables
/// plus `inputs`/`outputs`/`dependencies` bound to the glob-expanded,
/// space-joined lists gathered so far.
fn list_vars(vars: &Vars, target: &Target) -> Vars {
    let mut merged = vars.clone();
    merged.insert("inputs".to_string(), expand_globs(&target.inputs).join(" "));
    merged.insert("outputs".to_string(), expand_globs(&target.outputs).join(" "));
    merged.insert("dependencies".to_string(), expand_globs(&target.deps).join(" "));
    merged
}

fn expand_globs(patterns: &[String]) -> Vec<String> {
    patterns.iter().flat_map(|pattern| expand_glob(pattern)).collect()
}

/// A pattern with glob metacharacters expands to every matching file; a
/// plain path contributes itself only when it exists on disk.
fn expand_glob(pattern: &str) -> Vec<String> {
    if pattern.contains(['*', '?', '[']) {
        match glob(pattern) {
            Ok(paths) => paths
                .filter_map(Result::ok)
                .filter(|path| path.is_file())
                .map(|path| path.to_string_lossy().into_owned())
                .collect(),
            Err(err) => {
                warn!("Bad glob pattern {:?}: {:?}", pattern, err);
                vec![]
            }
        }
    } else if Path::new(pattern).exists() {
        vec![pattern.to_string()]
    } else {
        vec![]
    }
}

/// Expands `${var}` and `${{expr}}` occurrences until none remain. An
/// unbound variable collapses to its own name, so expansion always makes
/// progress.
fn expand_variables(input: &str, vars: &Vars, cfg: &Vars) -> String {
    let var_pattern = Regex::new(r"\$\{(\w+)\}").unwrap();
    let expr_pattern = Regex::new(r"\$\{\{([^}]+)\}\}").unwrap();

    let mut out = input.to_string();
    loop {
        let (range, expr) = match expr_pattern
            .captures(&out)
            .or_else(|| var_pattern.captures(&out))
        {
            Some(captures) => {
                let whole = captures.get(0).unwrap();
                (whole.range(), captures.get(1).unwrap().as_str().to_string())
            }
            None => break,
        };
        let replacement = evaluate_expression(&expr, vars, cfg);
        out.replace_range(range, &replacement);
    }
    out
}

/// An expression is either a plain variable name or the conditional form
/// `x if config.key == "value" else y`.
fn evaluate_expression(expr: &str, vars: &Vars, cfg: &Vars) -> String {
    let ternary =
        Regex::new(r#"^\s*(\w+)\s+if\s+config\.(\w+)\s*==\s*"([^"]+)"\s*else\s*(\w+)\s*$"#)
            .unwrap();

    if let Some(captures) = ternary.captures(expr) {
        let when_true = captures.get(1).unwrap().as_str();
        let cfg_key = captures.get(2).unwrap().as_str();
        let cfg_value = captures.get(3).unwrap().as_str();
        let when_false = captures.get(4).unwrap().as_str();

        let matches = cfg.get(cfg_key).map(|v| v == cfg_value).unwrap_or(false);
        let chosen = if matches { when_true } else { when_false };
        return vars.get(chosen).cloned().unwrap_or_default();
    }

    vars.get(expr).cloned().unwrap_or_else(|| expr.to_string())
}
