//=============================================
// solvra_intercept/errors.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Stable diagnostic codes for surfaced errors
// Objective: Map parser, loader and interception failures onto one
//            code-tagged error type for hosts and the CLI
//=============================================

use crate::intercept::InterceptError;
use crate::modules::ModuleError;
use crate::parser::ParseError;
use crate::rewrite::TransformError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Syntax,
    ModuleResolution,
    Evaluation,
    InvalidPolicy,
    UnsupportedPlatform,
    InterceptionBusy,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Syntax => "E001",
            ErrorCode::ModuleResolution => "E002",
            ErrorCode::Evaluation => "E004",
            ErrorCode::InvalidPolicy => "E006",
            ErrorCode::UnsupportedPlatform => "E007",
            ErrorCode::InterceptionBusy => "E008",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptError {
    pub code: ErrorCode,
    pub message: String,
}

impl ScriptError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ScriptError {}

impl From<ParseError> for ScriptError {
    fn from(value: ParseError) -> Self {
        ScriptError::new(ErrorCode::Syntax, value.to_string())
    }
}

impl From<TransformError> for ScriptError {
    fn from(value: TransformError) -> Self {
        ScriptError::new(ErrorCode::Syntax, value.to_string())
    }
}

impl From<ModuleError> for ScriptError {
    fn from(value: ModuleError) -> Self {
        ScriptError::new(module_error_code(&value), value.to_string())
    }
}

impl From<InterceptError> for ScriptError {
    fn from(value: InterceptError) -> Self {
        let code = match value {
            InterceptError::InvalidPolicy(_) => ErrorCode::InvalidPolicy,
            InterceptError::HookBusy { .. } => ErrorCode::InterceptionBusy,
        };
        ScriptError::new(code, value.to_string())
    }
}

fn module_error_code(error: &ModuleError) -> ErrorCode {
    match error {
        ModuleError::Parse { .. } | ModuleError::Transform { .. } => ErrorCode::Syntax,
        ModuleError::NotFound { .. } | ModuleError::Io { .. } | ModuleError::Cyclic { .. } => {
            ErrorCode::ModuleResolution
        }
        ModuleError::Evaluate { .. } => ErrorCode::Evaluation,
        ModuleError::UnsupportedPlatform { .. } => ErrorCode::UnsupportedPlatform,
    }
}
