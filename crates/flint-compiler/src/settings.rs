//! Compile settings.
//!
//! The closed settings surface of a compile session, deserializable from
//! the host build configuration. The sequencer override lists are data, not
//! constants: pulling new platform types into a program can require
//! extending them.

use serde::Deserialize;

/// Settings for one compile session.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CompileSettings {
    /// Freeze a kernel snapshot after the platform closure so user programs
    /// can reuse the flashed prefix.
    pub create_kernel_for_flashing: bool,
    /// Launch the program from flash at boot.
    pub launch_program_from_flash: bool,
    /// Place the user program in flash rather than RAM.
    pub use_flash_for_program: bool,
    /// Restart the program automatically after an abort.
    pub auto_restart_program: bool,
    /// Full names of types whose inclusion is forbidden, on top of the
    /// built-in suppressions.
    pub additional_suppressions: Vec<String>,
    /// Initializer-order overrides applied after the heuristic sort.
    pub sequencer: SequencerOverrides,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            create_kernel_for_flashing: false,
            launch_program_from_flash: false,
            use_flash_for_program: false,
            auto_restart_program: false,
            additional_suppressions: Vec::new(),
            sequencer: SequencerOverrides::default(),
        }
    }
}

/// Curated initializer-order overrides.
///
/// `bring_to_front` entries are each moved to index 0 in declared order, so
/// the last entry wins the very first slot. `send_to_back` entries are
/// appended in declared order. Names are full type names.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SequencerOverrides {
    pub bring_to_front: Vec<String>,
    pub send_to_back: Vec<String>,
}

impl Default for SequencerOverrides {
    fn default() -> Self {
        Self {
            // Known-minimum platform ordering constraints. Last wins slot 0:
            // the string-empty carrier initializer must run before anything
            // that touches a string.
            bring_to_front: vec![
                "System.Collections.HashHelpers".into(),
                "System.Text.UTF8Encoding".into(),
                "System.Text.Encoding".into(),
                "System.Text.EncoderFallback".into(),
                "System.Text.EncoderReplacementFallback".into(),
                "System.Text.EncoderExceptionFallback".into(),
                "System.Diagnostics.Tracing.EventSource".into(),
                "System.Threading.CancellationTokenSource".into(),
                "System.Globalization.CultureInfo".into(),
                "System.Diagnostics.Stopwatch".into(),
                "System.Collections.Generic.StringEqualityComparer".into(),
                "System.DateTime".into(),
                "System.String".into(),
            ],
            send_to_back: vec![
                "System.DateTimeFormat".into(),
                "System.TimeZoneInfo".into(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_front_list_ends_with_string_carrier() {
        let overrides = SequencerOverrides::default();
        assert_eq!(overrides.bring_to_front.last().unwrap(), "System.String");
    }

    #[test]
    fn deserializes_kebab_case() {
        let json = r#"{
            "create-kernel-for-flashing": true,
            "additional-suppressions": ["My.Heavy.Type"]
        }"#;
        let settings: CompileSettings = serde_json::from_str(json).unwrap();
        assert!(settings.create_kernel_for_flashing);
        assert!(!settings.launch_program_from_flash);
        assert_eq!(settings.additional_suppressions, vec!["My.Heavy.Type"]);
    }
}
