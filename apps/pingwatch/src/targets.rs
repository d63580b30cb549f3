use anyhow::{anyhow, Context, Result};
use pingwatch_model::TargetConfig;
use std::fs;
use std::path::Path;

/// Collect targets from an optional targets file followed by `--target`
/// values, keeping their order.
pub fn load_targets(file: Option<&Path>, inline: &[String]) -> Result<Vec<TargetConfig>> {
    let mut targets = Vec::new();

    if let Some(path) = file {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read targets file {path:?}"))?;
        targets.extend(
            parse_targets_file(&contents)
                .with_context(|| format!("invalid targets file {path:?}"))?,
        );
    }

    targets.extend(inline.iter().map(|value| parse_target_arg(value)));

    if targets.is_empty() {
        return Err(anyhow!("no targets provided (use --targets or --target)"));
    }

    Ok(targets)
}

/// One target per line, either `address` or `id address`. Blank lines and
/// `#` comments are skipped.
pub fn parse_targets_file(contents: &str) -> Result<Vec<TargetConfig>> {
    let mut targets = Vec::new();

    for (number, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let config = match tokens.as_slice() {
            [address] => TargetConfig::from_address(*address),
            [id, address] => TargetConfig::new(*id, *address),
            _ => {
                return Err(anyhow!(
                    "line {}: expected `address` or `id address`, got {:?}",
                    number + 1,
                    trimmed
                ))
            }
        };
        targets.push(config);
    }

    Ok(targets)
}

/// `id=address` or a bare `address`.
pub fn parse_target_arg(value: &str) -> TargetConfig {
    let value = value.trim();
    match value.split_once('=') {
        Some((id, address)) if !id.is_empty() && !id.contains(|c: char| c == ':' || c == '/') => {
            TargetConfig::new(id, address)
        }
        _ => TargetConfig::from_address(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_file_supports_ids_and_comments() {
        let contents = "# lab network\n\ngw 10.0.0.1\n  a.example  \nplc opc.tcp://plc.local:4840\n";
        let targets = parse_targets_file(contents).unwrap();
        assert_eq!(
            targets,
            vec![
                TargetConfig::new("gw", "10.0.0.1"),
                TargetConfig::from_address("a.example"),
                TargetConfig::new("plc", "opc.tcp://plc.local:4840"),
            ]
        );
    }

    #[test]
    fn targets_file_rejects_extra_columns() {
        let err = parse_targets_file("gw 10.0.0.1 extra").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn target_arg_with_and_without_id() {
        assert_eq!(parse_target_arg("gw=10.0.0.1"), TargetConfig::new("gw", "10.0.0.1"));
        assert_eq!(parse_target_arg("b.example"), TargetConfig::from_address("b.example"));
        assert_eq!(
            parse_target_arg("http://svc.example/?a=b"),
            TargetConfig::from_address("http://svc.example/?a=b")
        );
    }

    #[test]
    fn file_targets_come_before_inline_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.txt");
        fs::write(&path, "a.example\n").unwrap();

        let targets = load_targets(Some(&path), &["b.example".to_string()]).unwrap();
        let ids: Vec<&str> = targets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a.example", "b.example"]);
    }

    #[test]
    fn empty_target_list_is_an_error() {
        let err = load_targets(None, &[]).unwrap_err();
        assert!(err.to_string().contains("no targets"));
    }
}
