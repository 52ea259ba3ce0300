//! Cisco IOS-family prompt definitions.
//!
//! Covers IOS, IOS-XE and IOU consoles:
//! - user EXEC with `>` prompt
//! - privileged EXEC with `#` prompt
//! - configuration with `(config*)#` prompt
//!
//! # Prompt Examples
//!
//! ```text
//! Router>                     # user EXEC
//! Router#                     # privileged EXEC
//! Router(config)#             # global configuration
//! Router(config-if)#          # interface sub-mode
//! Router(dhcp-config)#        # DHCP pool sub-mode
//! ```

use crate::channel::CompiledPrompt;

use super::PromptSet;

/// Create the IOS-family prompt set.
pub fn prompts() -> PromptSet {
    let user = CompiledPrompt::new(r"(?m)^[\w.\-@/:]{1,63}>\s*$").unwrap();

    // not_contains "(" keeps every configuration sub-mode out
    let privileged =
        CompiledPrompt::with_not_contains(r"(?m)^[\w.\-@/:]{1,63}#\s*$", vec!["(".to_string()])
            .unwrap();

    let configuration =
        CompiledPrompt::new(r"(?m)^[\w.\-@/:]{1,63}\([\w.\-@/:+]{0,32}config[\w.\-@/:+]{0,32}\)#\s*$")
            .unwrap();

    PromptSet::new("cisco_ios", user, privileged, configuration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Mode;

    #[test]
    fn test_user_prompt_match() {
        let prompts = prompts();
        assert!(prompts.user.matches("Router>"));
        assert!(prompts.user.matches("IOU1> "));
        assert!(!prompts.user.matches("Router#"));
    }

    #[test]
    fn test_privileged_prompt_match() {
        let prompts = prompts();
        assert!(prompts.privileged.matches("Router#"));
        assert!(prompts.privileged.matches("csr1000v-1#"));
        assert!(!prompts.privileged.matches("Router(config)#"));
        assert!(!prompts.privileged.matches("Router(config-if)#"));
        assert!(!prompts.privileged.matches("Router>"));
    }

    #[test]
    fn test_configuration_prompt_match() {
        let prompts = prompts();
        assert!(prompts.configuration.matches("Router(config)#"));
        assert!(prompts.configuration.matches("Router(config-if)#"));
        assert!(prompts.configuration.matches("Router(config-router)#"));
        assert!(prompts.configuration.matches("Router(dhcp-config)#"));
        assert!(!prompts.configuration.matches("Router#"));
    }

    #[test]
    fn test_determine_mode_from_output() {
        let prompts = prompts();
        assert_eq!(prompts.determine("show clock\r\n12:00\r\nRouter>"), Some(Mode::User));
        assert_eq!(prompts.determine("\r\nRouter#\r\n"), Some(Mode::Privileged));
        assert_eq!(
            prompts.determine("Enter configuration commands\r\nRouter(config)#"),
            Some(Mode::Configuration)
        );
        assert_eq!(prompts.determine("Press RETURN to get started"), None);
    }

    #[test]
    fn test_determine_skips_trailing_log_lines() {
        let prompts = prompts();
        let output = "\r\nRouter#\r\n*Mar  1 00:00:05.123: %SYS-5-CONFIG_I: Configured from console by console\r\n";
        assert_eq!(prompts.determine(output), Some(Mode::Privileged));

        let output = "\r\nRouter>\r\n%LINK-3-UPDOWN: Interface Ethernet0/0, changed state to up\r\n";
        assert_eq!(prompts.determine(output), Some(Mode::User));
    }
}
