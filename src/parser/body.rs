//! Method bodies: statements and expressions to IL
//!
//! Every expression evaluates to a [`ValueData`]. Values remember where they
//! were read from ([`Origin`]) so assignments can be written back through
//! fields, elements, indexers and properties.

use super::cursor::TokenCursor;
use super::declarations::parse_type_name;
use super::diagnostics::{CompilationError, CompilationErrorType};
use super::literal::LiteralValue;
use super::operators::BinaryOperator;
use super::scope::{keyword_type, TypeScope};
use crate::error::{Error, Result};
use crate::il::{IlContainer, IlGenerator};
use crate::ir::{MethodRef, NeslOperators, TypeRef};
use crate::lexer::{Token, TokenKind};
use std::collections::HashMap;
use std::ops::Range;

/// Why an expression or statement was abandoned
pub(super) enum BodyError {
    /// New diagnostic to report
    Diagnostic(CompilationError),
    /// Internal invariant violation; aborts compilation
    Internal(Error),
}

impl From<CompilationError> for BodyError {
    fn from(error: CompilationError) -> Self {
        BodyError::Diagnostic(error)
    }
}

impl From<Error> for BodyError {
    fn from(error: Error) -> Self {
        BodyError::Internal(error)
    }
}

pub(super) type BodyResult<T> = std::result::Result<T, BodyError>;

/// Result of an expression
#[derive(Clone, Debug)]
pub(super) enum ValueData {
    /// Result of a call to a void method
    Void,
    /// Value held by an IL variable
    Variable {
        id: u32,
        ty: TypeRef,
        origin: Origin,
    },
    /// Literal not yet bound to a type
    Literal { value: LiteralValue, token: Token },
    /// Type name used as the receiver of static members
    StaticType(TypeRef),
}

/// Storage a variable value was read from
#[derive(Clone, Debug)]
pub(super) enum Origin {
    /// Computed value, not assignable
    Temporary,
    /// Parameter or local; the variable is the storage
    Local,
    /// Instance field of `object`
    Field { object: Box<ValueData>, field: u32 },
    /// Static field
    StaticField { owner: TypeRef, field: u32 },
    /// Vector component
    Element { object: Box<ValueData>, index: u32 },
    /// Indexer getter result; `setter` writes it back
    Indexer {
        object: Box<ValueData>,
        index: u32,
        setter: Option<MethodRef>,
    },
    /// Property getter result
    Property {
        object: Option<Box<ValueData>>,
        setter: Option<MethodRef>,
    },
}

#[derive(Clone)]
pub(super) struct Local {
    pub id: u32,
    pub ty: TypeRef,
}

/// Compiles the body of one method
pub(super) struct MethodBodyParser<'a> {
    pub(super) cursor: TokenCursor<'a>,
    pub(super) scope: TypeScope<'a>,
    pub(super) owner: &'a TypeRef,
    pub(super) method: &'a MethodRef,
    pub(super) generator: IlGenerator,
    pub(super) diagnostics: Vec<CompilationError>,
    locals: Vec<HashMap<String, Local>>,
    return_type: Option<TypeRef>,
}

/// Compiles the token range `body` (braces included) of `method`
pub(crate) fn compile_body(
    scope: TypeScope<'_>,
    owner: &TypeRef,
    method: &MethodRef,
    body: Range<usize>,
) -> Result<(IlContainer, Vec<CompilationError>)> {
    let signature = method.signature()?;
    let offset = u32::from(!method.is_static());

    let mut parameters = HashMap::new();
    for (index, parameter) in signature.parameters.iter().enumerate() {
        parameters.insert(
            parameter.name.clone(),
            Local {
                id: index as u32 + offset,
                ty: parameter.parameter_type.clone(),
            },
        );
    }

    let mut parser = MethodBodyParser {
        cursor: TokenCursor::new(&scope.file.tokens, body.start, body.end),
        scope,
        owner,
        method,
        generator: IlGenerator::new(scope.assembly, signature.parameters.len() as u32 + offset),
        diagnostics: Vec::new(),
        locals: vec![parameters],
        return_type: signature.return_type,
    };

    parser.block()?;
    if !parser.generator.is_terminated() && parser.return_type.is_none() {
        parser.generator.ret()?;
    }
    Ok((parser.generator.build(), parser.diagnostics))
}

impl<'a> MethodBodyParser<'a> {
    // Statements

    /// `{ statement* }`; only internal errors escape
    fn block(&mut self) -> Result<()> {
        let open = self.cursor.position();
        let close = match self.cursor.partner(open) {
            Some(close) if self.cursor.check(TokenKind::CurlyOpen) => close,
            _ => {
                self.diagnostics
                    .push(self.cursor.error_here(CompilationErrorType::UnexpectedToken));
                return Ok(());
            }
        };
        self.cursor.advance();
        self.locals.push(HashMap::new());

        let mut warned = false;
        while self.cursor.position() < close && !self.cursor.is_at_end() {
            if self.generator.is_terminated() && !warned {
                self.diagnostics.push(CompilationError::at(
                    self.cursor.peek(),
                    CompilationErrorType::UnreachableCode,
                ));
                warned = true;
            }

            let start = self.cursor.position();
            match self.statement() {
                Ok(()) => {}
                Err(BodyError::Internal(error)) => return Err(error),
                Err(BodyError::Diagnostic(diagnostic)) => {
                    self.diagnostics.push(diagnostic);
                    if self.cursor.position() < close {
                        self.cursor.recover();
                    }
                    if self.cursor.position() == start {
                        self.cursor.advance();
                    }
                }
            }
        }

        self.locals.pop();
        self.cursor.seek(close + 1);
        Ok(())
    }

    fn statement(&mut self) -> BodyResult<()> {
        let token = self.cursor.peek();
        match token.kind {
            TokenKind::CurlyOpen => return self.block().map_err(BodyError::Internal),
            TokenKind::Semicolon => {
                self.cursor.advance();
                return Ok(());
            }
            TokenKind::Word => {}
            _ => return self.expression_statement(),
        }

        match token.text() {
            "if" => self.if_statement(),
            "while" => self.while_statement(),
            "return" => self.return_statement(),
            _ if self.looks_like_declaration() => self.declaration(),
            _ => self.expression_statement(),
        }
    }

    fn expect_semicolon(&mut self) -> BodyResult<()> {
        self.cursor
            .consume(TokenKind::Semicolon, CompilationErrorType::ExpectedSemicolon)?;
        Ok(())
    }

    fn if_statement(&mut self) -> BodyResult<()> {
        self.cursor.advance();
        let condition = self.parenthesized()?;
        let condition = self.coerce_to_boolean(condition)?;

        let then_label = self.generator.new_label();
        let merge_label = self.generator.new_label();
        let has_else = self.else_follows_statement();
        let else_label = if has_else {
            self.generator.new_label()
        } else {
            merge_label
        };

        self.generator.selection_merge(merge_label)?;
        self.generator.jump_if(condition, then_label, else_label)?;

        self.generator.mark_label(then_label)?;
        self.nested_statement()?;
        if !self.generator.is_terminated() {
            self.generator.jump(merge_label)?;
        }

        if has_else {
            self.cursor.match_word("else");
            self.generator.mark_label(else_label)?;
            self.nested_statement()?;
            if !self.generator.is_terminated() {
                self.generator.jump(merge_label)?;
            }
        }

        self.generator.mark_label(merge_label)?;
        Ok(())
    }

    fn while_statement(&mut self) -> BodyResult<()> {
        self.cursor.advance();
        let header = self.generator.new_label();
        let condition_label = self.generator.new_label();
        let body_label = self.generator.new_label();
        let continue_label = self.generator.new_label();
        let merge_label = self.generator.new_label();

        self.generator.jump(header)?;
        self.generator.mark_label(header)?;
        self.generator.loop_merge(merge_label, continue_label)?;
        self.generator.jump(condition_label)?;

        self.generator.mark_label(condition_label)?;
        let condition = self.parenthesized()?;
        let condition = self.coerce_to_boolean(condition)?;
        self.generator.jump_if(condition, body_label, merge_label)?;

        self.generator.mark_label(body_label)?;
        self.nested_statement()?;
        if !self.generator.is_terminated() {
            self.generator.jump(continue_label)?;
        }

        self.generator.mark_label(continue_label)?;
        self.generator.jump(header)?;
        self.generator.mark_label(merge_label)?;
        Ok(())
    }

    /// Statement that is the body of an `if`, `else` or `while`
    fn nested_statement(&mut self) -> BodyResult<()> {
        if self.cursor.check(TokenKind::CurlyOpen) {
            return self.block().map_err(BodyError::Internal);
        }
        self.locals.push(HashMap::new());
        let result = self.statement();
        self.locals.pop();
        result
    }

    /// Whether the statement at the cursor is followed by `else`
    fn else_follows_statement(&self) -> bool {
        let mut lookahead = self.cursor.clone();
        skip_statement(&mut lookahead);
        lookahead.check_word("else")
    }

    fn return_statement(&mut self) -> BodyResult<()> {
        let keyword = self.cursor.advance();
        match self.return_type.clone() {
            None => {
                if !self.cursor.check(TokenKind::Semicolon) {
                    return Err(CompilationError::at(keyword, CompilationErrorType::UnexpectedExpression).into());
                }
                self.expect_semicolon()?;
                self.generator.ret()?;
            }
            Some(return_type) => {
                let value = self.expression()?;
                let value = self.coerce(value, &return_type, keyword)?;
                self.expect_semicolon()?;
                self.generator.ret_value(value)?;
            }
        }
        Ok(())
    }

    /// `Type name = ...` or `Type name;` at the cursor
    fn looks_like_declaration(&self) -> bool {
        if matches!(
            self.cursor.peek().text(),
            "new" | "this" | "true" | "false" | "else"
        ) {
            return false;
        }
        let mut lookahead = self.cursor.clone();
        if parse_type_name(&mut lookahead).is_err() || !lookahead.check(TokenKind::Word) {
            return false;
        }
        matches!(
            lookahead.kind_at(1),
            TokenKind::Assignment | TokenKind::Semicolon
        )
    }

    fn declaration(&mut self) -> BodyResult<()> {
        let type_name = parse_type_name(&mut self.cursor)?;
        let ty = self.scope.resolve(&type_name)?;
        let name = self.cursor.identifier()?;

        let exists = self
            .locals
            .iter()
            .any(|scope| scope.contains_key(name.text()));
        if exists {
            return Err(CompilationError::at(name, CompilationErrorType::VariableAlreadyExists).into());
        }

        let id = self.generator.def_variable(&ty)?;
        self.locals
            .last_mut()
            .ok_or_else(|| Error::invalid_operation("no local scope"))?
            .insert(
                name.text().to_string(),
                Local { id, ty: ty.clone() },
            );

        if self.cursor.match_kind(TokenKind::Assignment).is_some() {
            let value = self.expression()?;
            let value = self.coerce(value, &ty, name)?;
            self.generator.load(id, value)?;
        } else if !self.cursor.check(TokenKind::Semicolon) {
            return Err(self.cursor.error_here(CompilationErrorType::ExpectedAssignment).into());
        }
        self.expect_semicolon()
    }

    fn expression_statement(&mut self) -> BodyResult<()> {
        let start = self.cursor.peek();
        let target = self.expression()?;

        let operator = self.cursor.peek().kind;
        if operator == TokenKind::Assignment {
            let token = self.cursor.advance();
            let value = self.expression()?;
            let ty = self.assignable_type(&target, token)?;
            let value = self.coerce(value, &ty, token)?;
            self.store(&target, value, token)?;
        } else if let Some(binary) = operator.compound_operator() {
            let token = self.cursor.advance();
            let operator = BinaryOperator::from_token(binary)
                .ok_or_else(|| CompilationError::at(token, CompilationErrorType::OperatorNotFound))?;
            let right = self.expression()?;
            let ty = self.assignable_type(&target, token)?;
            let result = self.binary(operator, target.clone(), right, token)?;
            let result = self.coerce(result, &ty, token)?;
            self.store(&target, result, token)?;
        } else {
            match target {
                ValueData::Literal { .. } | ValueData::StaticType(_) => {
                    return Err(CompilationError::at(start, CompilationErrorType::UnexpectedExpression).into())
                }
                _ => {}
            }
        }
        self.expect_semicolon()
    }

    // Expressions

    pub(super) fn expression(&mut self) -> BodyResult<ValueData> {
        self.logical_or()
    }

    fn parenthesized(&mut self) -> BodyResult<ValueData> {
        self.cursor
            .consume(TokenKind::RoundOpen, CompilationErrorType::UnexpectedToken)?;
        let value = self.expression()?;
        self.cursor
            .consume(TokenKind::RoundClose, CompilationErrorType::UnexpectedToken)?;
        Ok(value)
    }

    fn binary_level(
        &mut self,
        operators: &[TokenKind],
        next: fn(&mut Self) -> BodyResult<ValueData>,
    ) -> BodyResult<ValueData> {
        let mut left = next(self)?;
        while operators.contains(&self.cursor.kind_at(0)) {
            let token = self.cursor.advance();
            let operator = BinaryOperator::from_token(token.kind)
                .ok_or_else(|| CompilationError::at(token, CompilationErrorType::OperatorNotFound))?;
            let right = next(self)?;
            left = self.binary(operator, left, right, token)?;
        }
        Ok(left)
    }

    fn logical_or(&mut self) -> BodyResult<ValueData> {
        self.binary_level(&[TokenKind::Or], Self::logical_and)
    }

    fn logical_and(&mut self) -> BodyResult<ValueData> {
        self.binary_level(&[TokenKind::And], Self::equality)
    }

    fn equality(&mut self) -> BodyResult<ValueData> {
        self.binary_level(&[TokenKind::Equal, TokenKind::NotEqual], Self::comparison)
    }

    fn comparison(&mut self) -> BodyResult<ValueData> {
        self.binary_level(
            &[
                TokenKind::AngleOpen,
                TokenKind::AngleClose,
                TokenKind::LessOrEqual,
                TokenKind::GreaterOrEqual,
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> BodyResult<ValueData> {
        self.binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> BodyResult<ValueData> {
        self.binary_level(
            &[TokenKind::Star, TokenKind::Slash, TokenKind::Percent],
            Self::power,
        )
    }

    fn power(&mut self) -> BodyResult<ValueData> {
        let base = self.unary()?;
        if self.cursor.check(TokenKind::Power) {
            let token = self.cursor.advance();
            let exponent = self.power()?;
            return self.binary(BinaryOperator::Power, base, exponent, token);
        }
        Ok(base)
    }

    fn unary(&mut self) -> BodyResult<ValueData> {
        if self.cursor.check(TokenKind::Minus) {
            let token = self.cursor.advance();
            let operand = self.unary()?;
            return self.negate(operand, token);
        }
        if self.cursor.check(TokenKind::Exclamation) {
            let token = self.cursor.advance();
            let operand = self.unary()?;
            return self.not(operand, token);
        }
        self.postfix()
    }

    fn postfix(&mut self) -> BodyResult<ValueData> {
        let mut value = self.primary()?;
        loop {
            if self.cursor.check(TokenKind::Dot) {
                self.cursor.advance();
                let name = self.cursor.identifier()?;
                let generic_arguments = self.generic_call_arguments()?;
                value = if self.cursor.check(TokenKind::RoundOpen) {
                    let arguments = self.call_arguments()?;
                    self.call_member(value, name, &generic_arguments, arguments)?
                } else {
                    self.member(value, name)?
                };
            } else if self.cursor.check(TokenKind::SquareOpen) {
                let token = self.cursor.advance();
                let index = self.expression()?;
                self.cursor
                    .consume(TokenKind::SquareClose, CompilationErrorType::UnexpectedToken)?;
                value = self.index(value, index, token)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn primary(&mut self) -> BodyResult<ValueData> {
        let token = self.cursor.peek();
        match token.kind {
            TokenKind::Number => {
                self.cursor.advance();
                let value = LiteralValue::parse(token.text(), false)
                    .map_err(|error| CompilationError::at(token, error))?;
                Ok(ValueData::Literal {
                    value,
                    token: token.clone(),
                })
            }
            TokenKind::RoundOpen => self.parenthesized(),
            TokenKind::Word => self.name(),
            _ => Err(self.cursor.error_here(CompilationErrorType::UnexpectedExpression).into()),
        }
    }

    /// `<Args>` of an explicit generic method call
    fn generic_call_arguments(&mut self) -> BodyResult<Vec<TypeRef>> {
        if !self.cursor.at_matched_open(TokenKind::AngleOpen) {
            return Ok(Vec::new());
        }
        let closer = match self.cursor.partner(self.cursor.position()) {
            Some(closer) => closer,
            None => return Ok(Vec::new()),
        };
        let follows_call = self
            .cursor
            .tokens()
            .get(closer + 1)
            .map_or(false, |token| token.kind == TokenKind::RoundOpen);
        if !follows_call {
            return Ok(Vec::new());
        }

        self.cursor.advance();
        let mut arguments = Vec::new();
        loop {
            let name = parse_type_name(&mut self.cursor)?;
            arguments.push(self.scope.resolve(&name)?);
            if self.cursor.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.cursor
            .consume(TokenKind::AngleClose, CompilationErrorType::UnexpectedToken)?;
        Ok(arguments)
    }

    /// `( expr, ... )`
    fn call_arguments(&mut self) -> BodyResult<Vec<ValueData>> {
        self.cursor
            .consume(TokenKind::RoundOpen, CompilationErrorType::UnexpectedToken)?;
        let mut arguments = Vec::new();
        if self.cursor.match_kind(TokenKind::RoundClose).is_some() {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.expression()?);
            if self.cursor.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        if self.cursor.match_kind(TokenKind::RoundClose).is_none() {
            return Err(self.cursor.error_here(CompilationErrorType::ExpectedComma).into());
        }
        Ok(arguments)
    }

    fn this_value(&self, token: &Token) -> BodyResult<ValueData> {
        if self.method.is_static() {
            return Err(CompilationError::at(token, CompilationErrorType::UnexpectedExpression).into());
        }
        Ok(ValueData::Variable {
            id: 0,
            ty: self.owner.clone(),
            origin: Origin::Local,
        })
    }

    /// Identifier at the start of an expression
    fn name(&mut self) -> BodyResult<ValueData> {
        let token = self.cursor.advance();
        match token.text() {
            "true" | "false" => {
                let value = LiteralValue::parse(token.text(), false)
                    .map_err(|error| CompilationError::at(token, error))?;
                return Ok(ValueData::Literal {
                    value,
                    token: token.clone(),
                });
            }
            "this" => return self.this_value(token),
            "new" => return self.construct(token),
            _ => {}
        }

        let generic_arguments = self.generic_call_arguments()?;
        if self.cursor.check(TokenKind::RoundOpen) {
            let arguments = self.call_arguments()?;
            return self.call_unqualified(token, &generic_arguments, arguments);
        }

        if let Some(local) = self.find_local(token.text()) {
            return Ok(ValueData::Variable {
                id: local.id,
                ty: local.ty,
                origin: Origin::Local,
            });
        }

        if keyword_type(token.text()).is_none() {
            let owner = self.owner.clone();
            if let Some(value) = self.owner_member(&owner, token)? {
                return Ok(value);
            }
        }

        self.static_type(token)
    }

    fn find_local(&self, name: &str) -> Option<Local> {
        self.locals
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    /// Field or property of the declaring type named by `token`
    fn owner_member(&mut self, owner: &TypeRef, token: &Token) -> BodyResult<Option<ValueData>> {
        let has_field = owner.get_field(token.text())?.is_some();
        let has_property = !owner
            .get_methods(&NeslOperators::property_get(token.text()))?
            .is_empty();
        if !has_field && !has_property {
            return Ok(None);
        }

        let field_is_static = owner
            .get_field(token.text())?
            .map_or(false, |(_, field)| field.is_static());
        let receiver = if self.method.is_static() || field_is_static {
            ValueData::StaticType(owner.clone())
        } else {
            self.this_value(token)?
        };
        self.member(receiver, token).map(Some)
    }

    /// Type name, possibly dotted, used as a static receiver
    fn static_type(&mut self, token: &'a Token) -> BodyResult<ValueData> {
        let mut segments = vec![token.text().to_string()];
        let mut offset = 0;
        while self.cursor.kind_at(offset) == TokenKind::Dot
            && self.cursor.kind_at(offset + 1) == TokenKind::Word
        {
            segments.push(self.cursor.peek_at(offset + 1).text().to_string());
            offset += 2;
        }

        for count in (1..=segments.len()).rev() {
            if let Some(ty) = self.scope.lookup(&segments[..count], &[], token)? {
                for _ in 1..count {
                    self.cursor.advance();
                    self.cursor.advance();
                }
                return Ok(ValueData::StaticType(ty));
            }
        }

        Err(CompilationError::at(token, CompilationErrorType::VariableNotFound)
            .with_detail(token.text())
            .into())
    }

    /// `new Type(args)`
    fn construct(&mut self, keyword: &Token) -> BodyResult<ValueData> {
        let type_name = parse_type_name(&mut self.cursor)?;
        let ty = self.scope.resolve(&type_name)?;
        let arguments = self.call_arguments()?;

        let constructors = ty.get_methods(NeslOperators::CONSTRUCTOR).unwrap_or_default();
        if constructors.is_empty() && arguments.is_empty() {
            let id = self.generator.def_variable(&ty)?;
            return Ok(ValueData::Variable {
                id,
                ty,
                origin: Origin::Temporary,
            });
        }

        match self.select_overload(&constructors, &[], true, false, &arguments, keyword)? {
            Some(constructor) => self.emit_call(&constructor, None, arguments, keyword),
            None => Err(CompilationError::at(keyword, CompilationErrorType::ConstructorNotFound)
                .with_detail(ty.full_name())
                .into()),
        }
    }
}

/// Moves `cursor` past one statement without interpreting it
fn skip_statement(cursor: &mut TokenCursor<'_>) {
    if cursor.check(TokenKind::CurlyOpen) {
        if cursor.skip_bracket().is_none() {
            cursor.advance();
        }
        return;
    }
    if cursor.check_word("if") {
        cursor.advance();
        if cursor.skip_bracket().is_none() {
            return;
        }
        skip_statement(cursor);
        if cursor.match_word("else") {
            skip_statement(cursor);
        }
        return;
    }
    if cursor.check_word("while") {
        cursor.advance();
        if cursor.skip_bracket().is_some() {
            skip_statement(cursor);
        }
        return;
    }
    while !cursor.is_at_end() {
        match cursor.peek().kind {
            TokenKind::Semicolon => {
                cursor.advance();
                return;
            }
            TokenKind::CurlyClose => return,
            TokenKind::RoundOpen | TokenKind::SquareOpen | TokenKind::CurlyOpen => {
                if cursor.skip_bracket().is_none() {
                    cursor.advance();
                }
            }
            _ => {
                cursor.advance();
            }
        }
    }
}
