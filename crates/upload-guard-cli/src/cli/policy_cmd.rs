//! `upload-guard policy`: show the effective policy.

use crate::cli::output;
use crate::cli::{KindArg, Settings};
use anyhow::Result;

/// Print the effective policy for `kind` as pretty JSON on stdout.
pub fn run(settings: &Settings, kind: KindArg) -> Result<()> {
    let policy = settings.policy(kind.into())?;
    let value = serde_json::to_value(&policy)?;
    output::print_json(&value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_serializes_effective_limits() {
        let settings = Settings {
            max_size: Some(1024),
            ..Default::default()
        };
        let policy = settings.policy(KindArg::Svg.into()).unwrap();
        let value = serde_json::to_value(&policy).unwrap();
        assert_eq!(value["max_size"], 1024);
        assert!(run(&settings, KindArg::Xml).is_ok());
    }
}
