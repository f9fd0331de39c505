//! expc-par - Parser and SSA lowering
//!
//! The parser lowers source text straight into function-level SSA: there
//! is no AST. Every `const` binding and intermediate value becomes a
//! densely numbered SSA local, tuple literals and call argument lists are
//! interned in the constants pool, and arithmetic whose operands are both
//! immediates is folded at parse time with checked arithmetic, so the IR
//! handed to analysis never contains trivially foldable instructions.
//!
//! Grammar:
//!
//! ```text
//! definition  = "fn" identifier "(" formal-args? ")" body
//!             | "const" identifier "=" expression ";"
//! formal-args = identifier ":" type ("," identifier ":" type)*
//! body        = "{" statement* "}"
//! statement   = "return" expression ";"
//!             | "const" identifier "=" expression ";"
//! expression  = basic (binop expression)*     (precedence climbing)
//! basic       = integer | "true" | "false"
//!             | "-" basic
//!             | "(" ")"
//!             | "(" expression ("," expression)* ")"
//!             | identifier ("(" actual-args? ")" | "." integer)?
//! type        = "nil" | "bool" | "i8" | ... | "u64"
//!             | "(" type ("," type)* ")"
//! ```

use rustc_hash::FxHashMap;

use expc_ir::{
    CompileError, Context, ErrorCode, Function, Global, Immediate, Instruction, Operand, TypeId,
    Value,
};
use expc_lex::{Lexer, Token};
use expc_util::{int, Symbol};

/// Parse `source`, populating the context's symbol table, constants pool
/// and label table.
pub fn parse_source(source: &str, context: &mut Context) -> Result<(), CompileError> {
    let mut parser = Parser::new(source, context)?;
    parser.parse()
}

/// Binding powers for the binary operators.
fn precedence(token: Token) -> Option<u8> {
    match token {
        Token::Plus | Token::Minus => Some(10),
        Token::Star | Token::Slash | Token::Percent => Some(20),
        _ => None,
    }
}

struct Parser<'ctx, 'src> {
    lexer: Lexer<'src>,
    token: Token,
    context: &'ctx mut Context,
    /// Top-level `const` bindings, usable from any later function body.
    globals: FxHashMap<Symbol, Operand>,
    /// The function currently being lowered, if any.
    current: Option<FunctionScope>,
}

struct FunctionScope {
    function: Function,
    bindings: FxHashMap<Symbol, Operand>,
}

impl<'ctx, 'src> Parser<'ctx, 'src> {
    fn new(source: &'src str, context: &'ctx mut Context) -> Result<Self, CompileError> {
        let mut lexer = Lexer::new(source);
        let token = lexer.scan().map_err(lex_error)?;
        Ok(Self {
            lexer,
            token,
            context,
            globals: FxHashMap::default(),
            current: None,
        })
    }

    fn parse(&mut self) -> Result<(), CompileError> {
        while self.token != Token::Eof {
            match self.token {
                Token::Fn => self.parse_function()?,
                Token::Const => self.parse_global_const()?,
                other => {
                    return Err(self.error(format!("expected 'fn' or 'const', found '{other}'")))
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // token plumbing

    fn advance(&mut self) -> Result<Token, CompileError> {
        let token = self.token;
        self.token = self.lexer.scan().map_err(lex_error)?;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), CompileError> {
        if self.token == expected {
            self.advance()?;
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}', found '{}'", self.token)))
        }
    }

    fn expect_identifier(&mut self) -> Result<Symbol, CompileError> {
        match self.token {
            Token::Ident(symbol) => {
                self.advance()?;
                Ok(symbol)
            }
            other => Err(self.error(format!("expected identifier, found '{other}'"))),
        }
    }

    fn error(&self, message: String) -> CompileError {
        CompileError::new(
            ErrorCode::Parse,
            format!("{}:{}: {message}", self.lexer.line(), self.lexer.column()),
        )
    }

    // ------------------------------------------------------------------
    // definitions

    fn parse_function(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Fn)?;
        let name = self.expect_identifier()?;

        let mut scope = FunctionScope {
            function: Function::new(),
            bindings: FxHashMap::default(),
        };

        self.expect(Token::LParen)?;
        if self.token != Token::RParen {
            loop {
                let argument = self.expect_identifier()?;
                self.expect(Token::Colon)?;
                let ty = self.parse_type()?;
                let id = scope.function.new_argument(argument, ty);
                scope.bindings.insert(argument, Operand::Ssa(id));
                if self.token != Token::Comma {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(Token::RParen)?;

        self.current = Some(scope);
        self.expect(Token::LBrace)?;
        while self.token != Token::RBrace {
            self.parse_statement()?;
        }
        self.expect(Token::RBrace)?;
        let scope = self.current.take().expect("function scope");

        if !self.context.symbols.insert(Global::function(name, scope.function)) {
            return Err(self.error(format!("redefinition of '{name}'")));
        }
        self.context.declaration_order.push(name);
        Ok(())
    }

    fn parse_global_const(&mut self) -> Result<(), CompileError> {
        self.expect(Token::Const)?;
        let name = self.expect_identifier()?;
        self.expect(Token::Equal)?;
        let operand = self.parse_expression(0)?;
        self.expect(Token::Semicolon)?;
        if self.globals.insert(name, operand).is_some() {
            return Err(self.error(format!("redefinition of '{name}'")));
        }
        Ok(())
    }

    fn parse_type(&mut self) -> Result<TypeId, CompileError> {
        match self.token {
            Token::Ident(name) => {
                self.advance()?;
                let types = &mut self.context.types;
                match name.as_str() {
                    "nil" => Ok(types.nil()),
                    "bool" => Ok(types.boolean()),
                    "i8" => Ok(types.i8()),
                    "i16" => Ok(types.i16()),
                    "i32" => Ok(types.i32()),
                    "i64" => Ok(types.i64()),
                    "u8" => Ok(types.u8()),
                    "u16" => Ok(types.u16()),
                    "u32" => Ok(types.u32()),
                    "u64" => Ok(types.u64()),
                    other => Err(self.error(format!("unknown type '{other}'"))),
                }
            }
            Token::LParen => {
                self.advance()?;
                let mut elements = Vec::new();
                if self.token != Token::RParen {
                    loop {
                        elements.push(self.parse_type()?);
                        if self.token != Token::Comma {
                            break;
                        }
                        self.advance()?;
                    }
                }
                self.expect(Token::RParen)?;
                Ok(self.context.types.tuple(elements))
            }
            other => Err(self.error(format!("expected type, found '{other}'"))),
        }
    }

    // ------------------------------------------------------------------
    // statements

    fn parse_statement(&mut self) -> Result<(), CompileError> {
        match self.token {
            Token::Return => {
                self.advance()?;
                let value = self.parse_expression(0)?;
                self.expect(Token::Semicolon)?;
                let result = self.scope()?.function.new_local(None);
                self.scope()?
                    .function
                    .block
                    .append(Instruction::Ret { result, value });
                Ok(())
            }
            Token::Const => {
                self.advance()?;
                let name = self.expect_identifier()?;
                self.expect(Token::Equal)?;
                let value = self.parse_expression(0)?;
                self.expect(Token::Semicolon)?;
                // a const binding is an SSA local loaded with the value,
                // so later uses have a lifetime to track
                let dst = self.scope()?.function.new_local(Some(name));
                self.scope()?
                    .function
                    .block
                    .append(Instruction::Load { dst, src: value });
                self.scope()?.bindings.insert(name, Operand::Ssa(dst));
                Ok(())
            }
            other => Err(self.error(format!("expected 'return' or 'const', found '{other}'"))),
        }
    }

    // ------------------------------------------------------------------
    // expressions

    fn parse_expression(&mut self, min_precedence: u8) -> Result<Operand, CompileError> {
        let mut lhs = self.parse_basic()?;
        while let Some(prec) = precedence(self.token) {
            if prec < min_precedence {
                break;
            }
            let operator = self.advance()?;
            // left associative: climb with a higher minimum
            let rhs = self.parse_expression(prec + 1)?;
            lhs = self.apply_binop(operator, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_basic(&mut self) -> Result<Operand, CompileError> {
        match self.token {
            Token::Integer(value) => {
                self.advance()?;
                Ok(Operand::Immediate(integer_immediate(value)))
            }
            Token::True => {
                self.advance()?;
                Ok(Operand::Constant(self.context.constants.append(Value::Bool(true))))
            }
            Token::False => {
                self.advance()?;
                Ok(Operand::Constant(self.context.constants.append(Value::Bool(false))))
            }
            Token::Minus => {
                self.advance()?;
                let operand = self.parse_basic()?;
                self.apply_negate(operand)
            }
            Token::LParen => {
                self.advance()?;
                if self.token == Token::RParen {
                    self.advance()?;
                    return Ok(Operand::Constant(self.context.constants.append(Value::Nil)));
                }
                let first = self.parse_expression(0)?;
                if self.token == Token::Comma {
                    let mut elements = vec![first];
                    while self.token == Token::Comma {
                        self.advance()?;
                        elements.push(self.parse_expression(0)?);
                    }
                    self.expect(Token::RParen)?;
                    let id = self.context.constants.append(Value::Tuple(elements));
                    Ok(Operand::Constant(id))
                } else {
                    self.expect(Token::RParen)?;
                    Ok(first)
                }
            }
            Token::Ident(name) => {
                self.advance()?;
                match self.token {
                    Token::LParen => self.parse_call(name),
                    Token::Dot => {
                        let base = self.lookup(name)?;
                        self.parse_dot(base)
                    }
                    _ => self.lookup(name),
                }
            }
            other => Err(self.error(format!("expected expression, found '{other}'"))),
        }
    }

    fn parse_call(&mut self, name: Symbol) -> Result<Operand, CompileError> {
        self.expect(Token::LParen)?;
        let mut arguments = Vec::new();
        if self.token != Token::RParen {
            loop {
                arguments.push(self.parse_expression(0)?);
                if self.token != Token::Comma {
                    break;
                }
                self.advance()?;
            }
        }
        self.expect(Token::RParen)?;

        let callee = Operand::Label(self.context.labels.insert(name));
        let arguments = Operand::Constant(self.context.constants.append(Value::Tuple(arguments)));
        let dst = self.scope()?.function.new_local(None);
        self.scope()?.function.block.append(Instruction::Call {
            dst,
            callee,
            arguments,
        });
        Ok(Operand::Ssa(dst))
    }

    fn parse_dot(&mut self, base: Operand) -> Result<Operand, CompileError> {
        self.expect(Token::Dot)?;
        let index = match self.token {
            Token::Integer(value) if int::fits_i32(value) => value as i32,
            _ => return Err(self.error(format!("expected tuple index, found '{}'", self.token))),
        };
        self.advance()?;

        let dst = self.scope()?.function.new_local(None);
        self.scope()?.function.block.append(Instruction::Dot {
            dst,
            tuple: base,
            index: Operand::Immediate(Immediate::I32(index)),
        });
        Ok(Operand::Ssa(dst))
    }

    fn lookup(&mut self, name: Symbol) -> Result<Operand, CompileError> {
        if let Some(scope) = &self.current {
            if let Some(&operand) = scope.bindings.get(&name) {
                return Ok(operand);
            }
        }
        if let Some(&operand) = self.globals.get(&name) {
            return Ok(operand);
        }
        Err(CompileError::undefined_symbol(name.as_str()))
    }

    fn scope(&mut self) -> Result<&mut FunctionScope, CompileError> {
        match &mut self.current {
            Some(scope) => Ok(scope),
            None => Err(CompileError::new(
                ErrorCode::Parse,
                "expected constant expression outside of a function body",
            )),
        }
    }

    // ------------------------------------------------------------------
    // folding and instruction building

    fn apply_negate(&mut self, operand: Operand) -> Result<Operand, CompileError> {
        if let Operand::Immediate(immediate) = operand {
            let value = fold_check(i64::try_from(immediate.value()).ok().and_then(i64::checked_neg))?;
            return Ok(Operand::Immediate(integer_immediate(value)));
        }
        let dst = self.scope()?.function.new_local(None);
        self.scope()?
            .function
            .block
            .append(Instruction::Neg { dst, operand });
        Ok(Operand::Ssa(dst))
    }

    fn apply_binop(
        &mut self,
        operator: Token,
        lhs: Operand,
        rhs: Operand,
    ) -> Result<Operand, CompileError> {
        if let (Operand::Immediate(left), Operand::Immediate(right)) = (lhs, rhs) {
            return Ok(Operand::Immediate(fold_binop(operator, left, right)?));
        }

        let dst = self.scope()?.function.new_local(None);
        let instruction = match operator {
            Token::Plus => Instruction::Add { dst, lhs, rhs },
            Token::Minus => Instruction::Sub { dst, lhs, rhs },
            Token::Star => Instruction::Mul { dst, lhs, rhs },
            Token::Slash => Instruction::Div { dst, lhs, rhs },
            Token::Percent => Instruction::Mod { dst, lhs, rhs },
            _ => unreachable!("non-operator token in binop position"),
        };
        self.scope()?.function.block.append(instruction);
        Ok(Operand::Ssa(dst))
    }
}

/// The immediate representation of an integer literal: `i32` when the
/// value fits, `i64` otherwise.
fn integer_immediate(value: i64) -> Immediate {
    if int::fits_i32(value) {
        Immediate::I32(value as i32)
    } else {
        Immediate::I64(value)
    }
}

fn lex_error(error: expc_lex::LexError) -> CompileError {
    CompileError::new(ErrorCode::Parse, error.to_string())
}

fn fold_check(value: Option<i64>) -> Result<i64, CompileError> {
    value.ok_or_else(|| {
        CompileError::new(
            ErrorCode::IntegerOverflow,
            "constant expression overflows i64",
        )
    })
}

/// Fold arithmetic whose operands are both immediates.
fn fold_binop(operator: Token, left: Immediate, right: Immediate) -> Result<Immediate, CompileError> {
    let (Ok(a), Ok(b)) = (i64::try_from(left.value()), i64::try_from(right.value())) else {
        return Err(CompileError::new(
            ErrorCode::IntegerOverflow,
            "constant expression overflows i64",
        ));
    };
    if matches!(operator, Token::Slash | Token::Percent) && b == 0 {
        return Err(CompileError::new(
            ErrorCode::DivisionByZero,
            "constant expression divides by zero",
        ));
    }
    let value = match operator {
        Token::Plus => fold_check(a.checked_add(b))?,
        Token::Minus => fold_check(a.checked_sub(b))?,
        Token::Star => fold_check(a.checked_mul(b))?,
        Token::Slash => fold_check(a.checked_div(b))?,
        Token::Percent => fold_check(a.checked_rem(b))?,
        _ => unreachable!("non-operator token in binop position"),
    };
    Ok(integer_immediate(value))
}
