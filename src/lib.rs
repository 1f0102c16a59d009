pub mod ast;
pub mod config;
pub mod errors;
pub mod intercept;
pub mod logging;
pub mod modules;
pub mod parser;
pub mod rewrite;
pub mod tokenizer;

pub use config::{InterceptConfig, PolicySpec};
pub use errors::{ErrorCode, ScriptError};
pub use intercept::{
    InterceptError, InterceptionPolicy, Interceptor, IntoPolicy, RestoreToken, ScopeGuard, ScopedFuture,
};
pub use modules::{Module, ModuleError, ModuleLoader, Value};
pub use rewrite::{LiteralReplacer, NodeRewriter, SyntaxNode, TransformError, Transformer, rewrite};
