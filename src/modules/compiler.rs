//=====================================================
// File: modules/compiler.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Default compile stage for SolvraScript modules
// Objective: Parse module text, resolve its imports through the loader and
//            evaluate its bindings into an export table
//=====================================================

use super::pipeline::{CompileRequest, CompileStage};
use super::{Module, ModuleError, ModuleLoader, Value};
use crate::ast::{Expr, Program, Stmt};
use crate::parser::parse_source;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x1000_0000_01b3;

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCompiler;

impl CompileStage for NativeCompiler {
    fn compile(&self, request: CompileRequest<'_>, loader: &ModuleLoader) -> Result<Module, ModuleError> {
        let program = parse_source(&request.content).map_err(|error| ModuleError::Parse {
            path: request.path.to_path_buf(),
            error,
        })?;
        let exports = evaluate(&program, request.path, loader)?;
        Ok(Module {
            id: request.path.to_path_buf(),
            exports,
            fingerprint: compute_fingerprint(&request.content),
        })
    }
}

fn evaluate(
    program: &Program,
    path: &Path,
    loader: &ModuleLoader,
) -> Result<BTreeMap<String, Value>, ModuleError> {
    let mut scope: HashMap<String, Value> = HashMap::new();
    let mut exports = BTreeMap::new();
    for stmt in &program.statements {
        match stmt {
            Stmt::Import {
                binding, source, ..
            } => {
                let module = loader.require_from(&source.value, Some(path))?;
                scope.insert(binding.name.clone(), Value::Module(module));
            }
            Stmt::Let { name, value, .. } => {
                let value = eval_expr(value, &scope, path)?;
                scope.insert(name.name.clone(), value);
            }
            Stmt::Export { name, value, .. } => {
                let value = eval_expr(value, &scope, path)?;
                scope.insert(name.name.clone(), value.clone());
                exports.insert(name.name.clone(), value);
            }
        }
    }
    Ok(exports)
}

fn eval_expr(expr: &Expr, scope: &HashMap<String, Value>, path: &Path) -> Result<Value, ModuleError> {
    match expr {
        Expr::Literal { value, .. } => Ok(Value::from(value)),
        Expr::Identifier(ident) => scope.get(&ident.name).cloned().ok_or_else(|| ModuleError::Evaluate {
            path: path.to_path_buf(),
            message: format!(
                "'{}' is not defined (line {}, column {})",
                ident.name, ident.span.start.line, ident.span.start.column
            ),
        }),
        Expr::Member {
            object, property, ..
        } => match eval_expr(object, scope, path)? {
            Value::Module(module) => module.exports.get(&property.name).cloned().ok_or_else(|| {
                ModuleError::Evaluate {
                    path: path.to_path_buf(),
                    message: format!(
                        "module '{}' has no export '{}'",
                        module.id.display(),
                        property.name
                    ),
                }
            }),
            other => Err(ModuleError::Evaluate {
                path: path.to_path_buf(),
                message: format!("cannot read '{}' of {}", property.name, other.type_name()),
            }),
        },
    }
}

pub fn compute_fingerprint(source: &str) -> String {
    hash_bytes(
        source
            .as_bytes()
            .iter()
            .copied()
            .chain(env!("CARGO_PKG_VERSION").as_bytes().iter().copied()),
    )
}

fn hash_bytes<I: IntoIterator<Item = u8>>(iter: I) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in iter {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{:016x}", hash)
}
