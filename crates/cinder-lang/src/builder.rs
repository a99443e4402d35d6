//! The bytecode builder.
//!
//! Walks a parsed program accumulating static-variable storage and a
//! function table keyed by a hash of the function name, then emits a
//! bytecode file. Only the 32-byte header is written; the instruction
//! encoding is not part of this stage.

use std::hash::{Hash, Hasher};
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHasher;

use cinder_util::{Handler, Symbol};

use crate::ast::{BinaryOp, Expr, FuncDecl, Item, Program, TypeName, UnaryOp, VarDecl};

/// Magic bytes opening every bytecode file.
pub const BYTECODE_MAGIC: [u8; 4] = *b"CNBC";
/// Bytecode format version.
pub const BYTECODE_VERSION: (u16, u16) = (0, 1);
/// Compiler version recorded in the header.
pub const COMPILER_VERSION: (u16, u16) = (0, 1);

/// Value types a static variable can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Float,
}

/// A top-level variable with its compile-time-evaluated storage.
#[derive(Clone, Debug)]
pub struct StaticVar {
    pub name: Symbol,
    pub ty: ValueType,
    /// Initial value bits: the integer itself, or an `f64` bit pattern.
    pub storage: u64,
}

/// One compiled function record.
#[derive(Clone, Debug)]
pub struct FunctionRecord {
    pub name: Symbol,
    /// Hash of the name, the function table's key.
    pub name_hash: u64,
    pub arity: usize,
}

/// Accumulates program state and emits the bytecode header.
pub struct BytecodeBuilder<'a> {
    handler: &'a Handler,
    statics: Vec<StaticVar>,
    functions: Vec<FunctionRecord>,
}

impl<'a> BytecodeBuilder<'a> {
    pub fn new(handler: &'a Handler) -> Self {
        Self {
            handler,
            statics: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Process every top-level item of a program.
    pub fn process(&mut self, program: &Program) {
        for item in &program.items {
            match item {
                Item::Var(decl) => self.add_static(decl),
                Item::Func(func) => self.add_function(func),
            }
        }
    }

    pub fn statics(&self) -> &[StaticVar] {
        &self.statics
    }

    pub fn functions(&self) -> &[FunctionRecord] {
        &self.functions
    }

    pub fn lookup_static(&self, name: Symbol) -> Option<&StaticVar> {
        self.statics.iter().find(|var| var.name == name)
    }

    /// Find a function record by its name hash.
    pub fn lookup_function(&self, name: Symbol) -> Option<&FunctionRecord> {
        let hash = hash_name(name);
        self.functions.iter().find(|f| f.name_hash == hash)
    }

    fn add_static(&mut self, decl: &VarDecl) {
        let declared = decl.ty.as_ref().and_then(|ty| match ty {
            TypeName::Int => Some(ValueType::Int),
            TypeName::Float => Some(ValueType::Float),
            TypeName::Named(name) => {
                self.handler.error(
                    format!("unknown type '{name}' in static declaration"),
                    decl.span,
                );
                None
            }
        });

        let ty = match declared {
            Some(ty) => ty,
            None => {
                let Some(init) = decl.init.as_ref() else {
                    self.handler.error(
                        format!("cannot infer a type for '{}'", decl.name),
                        decl.span,
                    );
                    return;
                };
                match self.infer_type(init) {
                    Some(ty) => ty,
                    None => {
                        self.handler.error(
                            format!("failed to infer type for '{}'", decl.name),
                            decl.span,
                        );
                        return;
                    }
                }
            }
        };

        let storage = match decl.init.as_ref() {
            Some(init) => match self.eval_const(init, ty) {
                Some(bits) => bits,
                None => {
                    self.handler.error(
                        format!("initializer of '{}' is not a constant expression", decl.name),
                        decl.span,
                    );
                    return;
                }
            },
            None => 0,
        };

        tracing::debug!(name = %decl.name, ?ty, "static variable");
        self.statics.push(StaticVar {
            name: decl.name,
            ty,
            storage,
        });
    }

    fn add_function(&mut self, func: &FuncDecl) {
        let name_hash = hash_name(func.name);
        if self.functions.iter().any(|f| f.name_hash == name_hash) {
            self.handler.error(
                format!("function '{}' is defined twice", func.name),
                func.span,
            );
            return;
        }
        tracing::debug!(name = %func.name, arity = func.params.len(), "function");
        self.functions.push(FunctionRecord {
            name: func.name,
            name_hash,
            arity: func.params.len(),
        });
    }

    /// Infer int/float from an expression's shape.
    fn infer_type(&self, expr: &Expr) -> Option<ValueType> {
        match expr {
            Expr::IntLit { .. } => Some(ValueType::Int),
            Expr::RealLit { .. } => Some(ValueType::Float),
            Expr::Unary { operand, .. } => self.infer_type(operand),
            Expr::Binary { lhs, rhs, .. } => {
                let left = self.infer_type(lhs)?;
                let right = self.infer_type(rhs)?;
                Some(if left == ValueType::Float || right == ValueType::Float {
                    ValueType::Float
                } else {
                    ValueType::Int
                })
            }
            Expr::Ident { name, .. } => self.lookup_static(*name).map(|var| var.ty),
            _ => None,
        }
    }

    /// Fold a constant initializer to its storage bits.
    fn eval_const(&self, expr: &Expr, ty: ValueType) -> Option<u64> {
        match ty {
            ValueType::Int => self.eval_int(expr).map(|v| v as u64),
            ValueType::Float => self.eval_float(expr).map(f64::to_bits),
        }
    }

    fn eval_int(&self, expr: &Expr) -> Option<i64> {
        match expr {
            Expr::IntLit { value, .. } => Some(*value),
            Expr::Ident { name, .. } => {
                let var = self.lookup_static(*name)?;
                (var.ty == ValueType::Int).then_some(var.storage as i64)
            }
            Expr::Unary { op, operand, .. } => {
                let value = self.eval_int(operand)?;
                Some(match op {
                    UnaryOp::Plus => value,
                    UnaryOp::Neg => value.wrapping_neg(),
                    UnaryOp::Not => (value == 0) as i64,
                    UnaryOp::BitNot => !value,
                })
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let lhs = self.eval_int(lhs)?;
                let rhs = self.eval_int(rhs)?;
                Some(match op {
                    BinaryOp::Add => lhs.wrapping_add(rhs),
                    BinaryOp::Sub => lhs.wrapping_sub(rhs),
                    BinaryOp::Mul => lhs.wrapping_mul(rhs),
                    BinaryOp::Div => {
                        if rhs == 0 {
                            return None;
                        }
                        lhs.wrapping_div(rhs)
                    }
                    BinaryOp::Rem => {
                        if rhs == 0 {
                            return None;
                        }
                        lhs.wrapping_rem(rhs)
                    }
                    BinaryOp::Shl => lhs.wrapping_shl(rhs as u32 & 63),
                    BinaryOp::Shr => lhs.wrapping_shr(rhs as u32 & 63),
                    BinaryOp::BitAnd => lhs & rhs,
                    BinaryOp::BitOr => lhs | rhs,
                    BinaryOp::BitXor => lhs ^ rhs,
                    _ => return None,
                })
            }
            _ => None,
        }
    }

    fn eval_float(&self, expr: &Expr) -> Option<f64> {
        match expr {
            Expr::RealLit { value, .. } => Some(*value),
            Expr::IntLit { value, .. } => Some(*value as f64),
            Expr::Ident { name, .. } => {
                let var = self.lookup_static(*name)?;
                match var.ty {
                    ValueType::Float => Some(f64::from_bits(var.storage)),
                    ValueType::Int => Some(var.storage as i64 as f64),
                }
            }
            Expr::Unary { op, operand, .. } => {
                let value = self.eval_float(operand)?;
                match op {
                    UnaryOp::Plus => Some(value),
                    UnaryOp::Neg => Some(-value),
                    _ => None,
                }
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let lhs = self.eval_float(lhs)?;
                let rhs = self.eval_float(rhs)?;
                Some(match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Div => lhs / rhs,
                    _ => return None,
                })
            }
            _ => None,
        }
    }

    /// Write the 32-byte little-endian bytecode header:
    /// magic (4), version major/minor (u16 each), compiler version
    /// major/minor (u16 each), compile epoch (u64), 12 reserved zero
    /// bytes.
    pub fn emit(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(&BYTECODE_MAGIC)?;
        out.write_all(&BYTECODE_VERSION.0.to_le_bytes())?;
        out.write_all(&BYTECODE_VERSION.1.to_le_bytes())?;
        out.write_all(&COMPILER_VERSION.0.to_le_bytes())?;
        out.write_all(&COMPILER_VERSION.1.to_le_bytes())?;
        out.write_all(&compile_epoch().to_le_bytes())?;
        out.write_all(&[0u8; 12])?;
        Ok(())
    }
}

fn hash_name(name: Symbol) -> u64 {
    let mut hasher = FxHasher::default();
    name.as_str().hash(&mut hasher);
    hasher.finish()
}

/// Seconds since the epoch, with `SOURCE_DATE_EPOCH` taking precedence for
/// reproducible builds.
fn compile_epoch() -> u64 {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn build(source: &str) -> (Vec<StaticVar>, Vec<FunctionRecord>, Handler) {
        let handler = Handler::new();
        let (statics, functions) = {
            let tokens = Lexer::new(source, Symbol::intern("t.cn"), &handler).tokenize();
            let program = Parser::new(tokens, &handler).parse_program();
            let mut builder = BytecodeBuilder::new(&handler);
            builder.process(&program);
            (builder.statics().to_vec(), builder.functions().to_vec())
        };
        (statics, functions, handler)
    }

    #[test]
    fn static_int_with_inference() {
        let (statics, _, handler) = build("answer := 6 * 7;");
        assert!(!handler.has_errors());
        assert_eq!(statics.len(), 1);
        assert_eq!(statics[0].ty, ValueType::Int);
        assert_eq!(statics[0].storage, 42);
    }

    #[test]
    fn static_float_inference() {
        let (statics, _, handler) = build("pi := 3.0 + 0.25;");
        assert!(!handler.has_errors());
        assert_eq!(statics[0].ty, ValueType::Float);
        assert_eq!(f64::from_bits(statics[0].storage), 3.25);
    }

    #[test]
    fn typed_declaration_without_initializer() {
        let (statics, _, handler) = build("slot : int;");
        assert!(!handler.has_errors());
        assert_eq!(statics[0].storage, 0);
    }

    #[test]
    fn statics_may_reference_earlier_statics() {
        let (statics, _, handler) = build("base := 10;\nderived := base * 3;");
        assert!(!handler.has_errors());
        assert_eq!(statics[1].storage, 30);
    }

    #[test]
    fn non_constant_initializer_reports() {
        let (statics, _, handler) = build("x := f(1);");
        assert!(handler.has_errors());
        assert!(statics.is_empty());
    }

    #[test]
    fn functions_are_keyed_by_name_hash() {
        let (_, functions, handler) =
            build("one :: () -> int { return 1; }\ntwo :: (a: int) -> int { return a; }");
        assert!(!handler.has_errors());
        assert_eq!(functions.len(), 2);
        assert_ne!(functions[0].name_hash, functions[1].name_hash);
        assert_eq!(functions[1].arity, 1);
    }

    #[test]
    fn duplicate_function_reports() {
        let (_, functions, handler) = build("f :: () { }\nf :: () { }");
        assert!(handler.has_errors());
        assert_eq!(functions.len(), 1);
    }

    #[test]
    fn header_layout() {
        let handler = Handler::new();
        let builder = BytecodeBuilder::new(&handler);
        std::env::set_var("SOURCE_DATE_EPOCH", "1234567890");
        let mut buffer = Vec::new();
        builder.emit(&mut buffer).unwrap();
        std::env::remove_var("SOURCE_DATE_EPOCH");

        assert_eq!(buffer.len(), 32);
        assert_eq!(&buffer[0..4], b"CNBC");
        assert_eq!(
            u16::from_le_bytes([buffer[4], buffer[5]]),
            BYTECODE_VERSION.0
        );
        assert_eq!(
            u64::from_le_bytes(buffer[12..20].try_into().unwrap()),
            1234567890
        );
        assert!(buffer[20..32].iter().all(|&b| b == 0));
    }
}
