//! Capability registry (spec §4.3): two flag sets gating which requests may
//! leave the outbound queue.

use serde::{Deserialize, Serialize};

use super::message::Command;
use super::types::{
    BreakpointMode, ColumnDescriptor, ExceptionBreakpointsFilter,
};

/// Arguments sent with the `initialize` request. Every boolean field here
/// also becomes a declared client capability (spec §4.3).
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequestArguments {
    #[serde(rename = "clientID", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    pub lines_start_at1: bool,
    pub columns_start_at1: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_format: Option<String>,
    pub supports_variable_type: bool,
    pub supports_variable_paging: bool,
    pub supports_run_in_terminal_request: bool,
    pub supports_memory_references: bool,
    pub supports_progress_reporting: bool,
    pub supports_invalidated_event: bool,
    pub supports_memory_event: bool,
    pub supports_args_can_be_interpreted_by_shell: bool,
    pub supports_start_debugging_request: bool,
}

/// Client-declared capabilities, reflected from `InitializeRequestArguments`.
#[derive(Debug, Clone, Default)]
pub struct ClientCapabilities {
    pub supports_variable_type: bool,
    pub supports_variable_paging: bool,
    pub supports_run_in_terminal_request: bool,
    pub supports_memory_references: bool,
    pub supports_progress_reporting: bool,
    pub supports_invalidated_event: bool,
    pub supports_memory_event: bool,
    pub supports_args_can_be_interpreted_by_shell: bool,
    pub supports_start_debugging_request: bool,
}

impl From<&InitializeRequestArguments> for ClientCapabilities {
    fn from(args: &InitializeRequestArguments) -> Self {
        Self {
            supports_variable_type: args.supports_variable_type,
            supports_variable_paging: args.supports_variable_paging,
            supports_run_in_terminal_request: args.supports_run_in_terminal_request,
            supports_memory_references: args.supports_memory_references,
            supports_progress_reporting: args.supports_progress_reporting,
            supports_invalidated_event: args.supports_invalidated_event,
            supports_memory_event: args.supports_memory_event,
            supports_args_can_be_interpreted_by_shell: args
                .supports_args_can_be_interpreted_by_shell,
            supports_start_debugging_request: args.supports_start_debugging_request,
        }
    }
}

/// Adapter-declared capabilities, parsed from `InitializeResponse.body`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterCapabilities {
    #[serde(default)]
    pub supports_configuration_done_request: bool,
    #[serde(default)]
    pub supports_function_breakpoints: bool,
    #[serde(default)]
    pub supports_conditional_breakpoints: bool,
    #[serde(default)]
    pub supports_hit_conditional_breakpoints: bool,
    #[serde(default)]
    pub supports_evaluate_for_hovers: bool,
    #[serde(default)]
    pub supports_step_back: bool,
    #[serde(default)]
    pub supports_set_variable: bool,
    #[serde(default)]
    pub supports_restart_frame: bool,
    #[serde(default)]
    pub supports_goto_targets_request: bool,
    #[serde(default)]
    pub supports_step_in_targets_request: bool,
    #[serde(default)]
    pub supports_completions_request: bool,
    #[serde(default)]
    pub supports_modules_request: bool,
    #[serde(default)]
    pub supports_restart_request: bool,
    #[serde(default)]
    pub supports_exception_options: bool,
    #[serde(default)]
    pub supports_exception_info_request: bool,
    #[serde(default)]
    pub support_terminate_debuggee: bool,
    #[serde(default)]
    pub support_suspend_debuggee: bool,
    #[serde(default)]
    pub supports_delayed_stack_trace_loading: bool,
    #[serde(default)]
    pub supports_loaded_sources_request: bool,
    #[serde(default)]
    pub supports_log_points: bool,
    #[serde(default)]
    pub supports_terminate_threads_request: bool,
    #[serde(default)]
    pub supports_set_expression: bool,
    #[serde(default)]
    pub supports_terminate_request: bool,
    #[serde(default)]
    pub supports_data_breakpoints: bool,
    #[serde(default)]
    pub supports_read_memory_request: bool,
    #[serde(default)]
    pub supports_write_memory_request: bool,
    #[serde(default)]
    pub supports_disassemble_request: bool,
    #[serde(default)]
    pub supports_cancel_request: bool,
    #[serde(default)]
    pub supports_breakpoint_locations_request: bool,
    #[serde(default)]
    pub supports_clipboard_context: bool,
    #[serde(default)]
    pub supports_stepping_granularity: bool,
    #[serde(default)]
    pub supports_instruction_breakpoints: bool,
    #[serde(default)]
    pub supports_exception_filter_options: bool,
    #[serde(default)]
    pub supports_single_thread_execution_requests: bool,

    #[serde(default)]
    pub exception_breakpoint_filters: Vec<ExceptionBreakpointsFilter>,
    #[serde(default)]
    pub completion_trigger_characters: Vec<String>,
    #[serde(default)]
    pub additional_module_columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub supported_checksum_algorithms: Vec<String>,
    #[serde(default)]
    pub breakpoint_modes: Vec<BreakpointMode>,
}

/// Result of a capability-gate check; mirrors spec §4.3's rejection value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityGate {
    Allowed,
    Forbidden,
}

impl AdapterCapabilities {
    /// `is-request-allowed(command)` from spec §4.3. Does not consider
    /// connection state (that's `ConnectionState::permits`); a caller
    /// combines both gates.
    pub fn is_request_allowed(&self, command: Command) -> CapabilityGate {
        use Command::*;
        use CapabilityGate::*;

        let allowed = match command {
            // always allowed, core set
            Initialize | Launch | Attach | Disconnect | Threads | StackTrace | Scopes
            | Variables | Source | Evaluate | Pause | Continue | Next | StepIn | StepOut
            | SetBreakpoints | Locations => true,

            SetExceptionBreakpoints => self.exception_breakpoint_filters.len() > 1,

            ConfigurationDone => self.supports_configuration_done_request,
            SetFunctionBreakpoints => self.supports_function_breakpoints,
            SetVariable => self.supports_set_variable,
            RestartFrame => self.supports_restart_frame,
            GotoTargets => self.supports_goto_targets_request,
            StepInTargets => self.supports_step_in_targets_request,
            Completions => self.supports_completions_request,
            Modules => self.supports_modules_request,
            Restart => self.supports_restart_request,
            ExceptionInfo => self.supports_exception_info_request,
            LoadedSources => self.supports_loaded_sources_request,
            TerminateThreads => self.supports_terminate_threads_request,
            SetExpression => self.supports_set_expression,
            Terminate => self.supports_terminate_request,
            Cancel => self.supports_cancel_request,
            BreakpointLocations => self.supports_breakpoint_locations_request,
            SetInstructionBreakpoints => self.supports_instruction_breakpoints,
            ReadMemory => self.supports_read_memory_request,
            WriteMemory => self.supports_write_memory_request,
            Disassemble => self.supports_disassemble_request,
            // DAP has no separate `supportsGotoRequest`; a valid `goto`
            // target always comes from a prior `gotoTargets` response, so
            // the two requests share one capability.
            Goto => self.supports_goto_targets_request,
            StepBack | ReverseContinue => self.supports_step_back,
            DataBreakpointInfo | SetDataBreakpoints => self.supports_data_breakpoints,

            RunInTerminal | StartDebugging => false,
        };

        if allowed { Allowed } else { Forbidden }
    }
}
