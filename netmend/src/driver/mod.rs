//! Interactive script driver.
//!
//! Everything that holds a conversation with a device console lives here:
//! prompt/response sequences ([`InteractiveEvent`]), table-driven wizards
//! ([`WizardScript`]), the canned scripts built from them, and command
//! template rendering.
//!
//! Scripts are built on the two synchronization primitives of
//! [`Session`](crate::channel::Session): settle-then-probe for dialogs without
//! a reliable end marker, and read-until-pattern for everything else.

mod interactive;
pub(crate) mod response;
pub mod scripts;
mod template;
mod wizard;

pub use interactive::{
    Expect, InteractiveBuilder, InteractiveBuilderWithInput, InteractiveEvent, InteractiveResult,
    InteractiveStep,
};
pub use response::Response;
pub use scripts::{
    ApplianceSetup, FactoryDefaults, acquire_privileged, appliance_setup_script,
    configure_over_console, erase_startup_config, execute_commands, first_boot_script,
    initialize_router, reload_device, reload_script, setup_appliance,
};
pub use template::{render_command, render_commands};
pub use wizard::{
    Next, Reply, Transition, Unrecognized, WizardInputs, WizardReport, WizardScript, WizardState,
};
