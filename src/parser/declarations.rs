//! Top-level pass: declarations of one file
//!
//! Recognizes usings, the namespace, types and their members. Method bodies
//! are skipped with the bracket lengths computed by the lexer.

use super::cursor::TokenCursor;
use super::diagnostics::{CompilationError, CompilationErrorType};
use super::syntax::{
    AliasSyntax, AttributeSyntax, ConstraintSyntax, FieldSyntax, FileSyntax, LiteralSyntax,
    MethodSyntax, ParameterSyntax, TypeName, TypeSyntax, UsingSyntax,
};
use crate::ir::{Modifiers, TypeKind};
use crate::lexer::{Token, TokenKind};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

type ParseResult<T> = std::result::Result<T, CompilationError>;

/// Namespace implied by the directory part of `path`; empty at the root
pub fn namespace_from_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    match normalized.rsplit_once('/') {
        Some((directory, _)) => directory
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect::<Vec<_>>()
            .join("."),
        None => String::new(),
    }
}

/// Parses the declarations of one lexed file
pub(crate) fn parse_file(
    path: &str,
    tokens: Arc<Vec<Token>>,
    assembly_name: &str,
) -> (FileSyntax, Vec<CompilationError>) {
    let directory_namespace = namespace_from_path(path);
    let mut parser = DeclarationParser {
        cursor: TokenCursor::new(&tokens, 0, tokens.len()),
        diagnostics: Vec::new(),
    };

    for token in tokens.iter() {
        if token.is_unmatched_bracket() && !matches!(token.kind, TokenKind::AngleOpen | TokenKind::AngleClose) {
            parser
                .diagnostics
                .push(CompilationError::at(token, CompilationErrorType::UnmatchedBracket));
        }
    }

    let mut usings = Vec::new();
    let mut aliases = Vec::new();
    let mut types = Vec::new();
    let mut namespace = if directory_namespace.is_empty() {
        assembly_name.to_string()
    } else {
        directory_namespace.clone()
    };

    if parser.diagnostics.is_empty() {
        parser.parse_usings(&mut usings, &mut aliases);

        if let Some(keyword) = parser.cursor.peek().is_word("namespace").then(|| parser.cursor.advance()) {
            match parser.parse_namespace() {
                Ok(declared) => {
                    if !directory_namespace.is_empty() && declared != directory_namespace {
                        parser.diagnostics.push(
                            CompilationError::at(keyword, CompilationErrorType::NamespaceMismatch)
                                .with_detail(format!("expected `{}`", directory_namespace)),
                        );
                    }
                    namespace = declared;
                }
                Err(error) => {
                    parser.diagnostics.push(error);
                    parser.cursor.recover();
                }
            }
        }

        while !parser.cursor.is_at_end() {
            if parser.cursor.check(TokenKind::CurlyClose) {
                // closes a block namespace
                parser.cursor.advance();
                continue;
            }
            match parser.parse_type() {
                Ok(ty) => types.push(ty),
                Err(error) => {
                    parser.diagnostics.push(error);
                    parser.skip_declaration();
                }
            }
        }
    }

    let diagnostics = parser.diagnostics;
    let file = FileSyntax {
        path: path.to_string(),
        tokens,
        namespace,
        usings,
        aliases,
        types,
    };
    (file, diagnostics)
}

struct DeclarationParser<'a> {
    cursor: TokenCursor<'a>,
    diagnostics: Vec<CompilationError>,
}

impl<'a> DeclarationParser<'a> {
    fn parse_usings(&mut self, usings: &mut Vec<UsingSyntax>, aliases: &mut Vec<AliasSyntax>) {
        while self.cursor.check_word("using") {
            let keyword = self.cursor.advance();
            let parsed = (|| -> ParseResult<()> {
                if self.cursor.kind_at(1) == TokenKind::Assignment {
                    let name = self.cursor.identifier()?.clone();
                    self.cursor.advance();
                    let target = self.parse_type_name()?;
                    aliases.push(AliasSyntax { name, target });
                } else {
                    let namespace = self.parse_dotted()?;
                    usings.push(UsingSyntax {
                        token: keyword.clone(),
                        namespace,
                        used: AtomicBool::new(false),
                    });
                }
                self.cursor
                    .consume(TokenKind::Semicolon, CompilationErrorType::ExpectedSemicolon)?;
                Ok(())
            })();
            if let Err(error) = parsed {
                self.diagnostics.push(error);
                self.cursor.recover();
            }
        }
    }

    /// `namespace A.B;` or `namespace A.B {`; the opening brace is consumed
    /// and its closer skipped by the type loop
    fn parse_namespace(&mut self) -> ParseResult<String> {
        let namespace = self.parse_dotted()?;
        if self.cursor.match_kind(TokenKind::CurlyOpen).is_none() {
            self.cursor
                .consume(TokenKind::Semicolon, CompilationErrorType::ExpectedSemicolon)?;
        }
        Ok(namespace)
    }

    fn parse_dotted(&mut self) -> ParseResult<String> {
        let mut segments = vec![self.cursor.identifier()?.text().to_string()];
        while self.cursor.match_kind(TokenKind::Dot).is_some() {
            segments.push(self.cursor.identifier()?.text().to_string());
        }
        Ok(segments.join("."))
    }

    /// Skips the rest of a broken type declaration
    fn skip_declaration(&mut self) {
        while !self.cursor.is_at_end() {
            if self.cursor.check(TokenKind::CurlyOpen) {
                if self.cursor.skip_bracket().is_none() {
                    self.cursor.advance();
                }
                return;
            }
            self.cursor.advance();
        }
    }

    fn parse_type_name(&mut self) -> ParseResult<TypeName> {
        parse_type_name(&mut self.cursor)
    }

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::NONE;
        while let Some(modifier) = Modifiers::from_keyword(self.cursor.peek().text()) {
            if self.cursor.peek().kind != TokenKind::Word {
                break;
            }
            modifiers |= modifier;
            self.cursor.advance();
        }
        modifiers
    }

    fn parse_attributes(&mut self) -> ParseResult<Vec<AttributeSyntax>> {
        let mut attributes = Vec::new();
        while self.cursor.check(TokenKind::SquareOpen) {
            self.cursor.advance();
            let on_return = if self.cursor.check_word("return") && self.cursor.kind_at(1) == TokenKind::Colon {
                self.cursor.advance();
                self.cursor.advance();
                true
            } else {
                false
            };

            loop {
                let name = self.parse_type_name()?;
                let mut arguments = Vec::new();
                if self.cursor.match_kind(TokenKind::RoundOpen).is_some() {
                    if self.cursor.match_kind(TokenKind::RoundClose).is_none() {
                        loop {
                            arguments.push(parse_literal(&mut self.cursor)?);
                            if self.cursor.match_kind(TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                        self.cursor
                            .consume(TokenKind::RoundClose, CompilationErrorType::UnexpectedToken)?;
                    }
                }
                attributes.push(AttributeSyntax {
                    name,
                    arguments,
                    on_return,
                });
                if self.cursor.match_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.cursor
                .consume(TokenKind::SquareClose, CompilationErrorType::UnexpectedToken)?;
        }
        Ok(attributes)
    }

    fn parse_generic_parameters(&mut self) -> ParseResult<Vec<Token>> {
        let mut parameters = Vec::new();
        if self.cursor.match_kind(TokenKind::AngleOpen).is_some() {
            loop {
                parameters.push(self.cursor.identifier()?.clone());
                if self.cursor.match_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.cursor
                .consume(TokenKind::AngleClose, CompilationErrorType::UnexpectedToken)?;
        }
        Ok(parameters)
    }

    fn parse_constraints(&mut self) -> ParseResult<Vec<ConstraintSyntax>> {
        let mut constraints = Vec::new();
        while self.cursor.match_word("where") {
            let parameter = self.cursor.identifier()?.clone();
            self.cursor
                .consume(TokenKind::Colon, CompilationErrorType::UnexpectedToken)?;
            let mut required = vec![self.parse_type_name()?];
            while self.cursor.match_kind(TokenKind::Comma).is_some() {
                required.push(self.parse_type_name()?);
            }
            constraints.push(ConstraintSyntax {
                parameter,
                constraints: required,
            });
        }
        Ok(constraints)
    }

    fn parse_type(&mut self) -> ParseResult<TypeSyntax> {
        let attributes = self.parse_attributes()?;
        let modifiers = self.parse_modifiers();
        let kind = TypeKind::from_keyword(self.cursor.peek().text())
            .filter(|_| self.cursor.peek().kind == TokenKind::Word)
            .ok_or_else(|| self.cursor.error_here(CompilationErrorType::UnexpectedToken))?;
        self.cursor.advance();

        let name = self.cursor.identifier()?.clone();
        let generic_parameters = self.parse_generic_parameters()?;

        let mut interfaces = Vec::new();
        if self.cursor.match_kind(TokenKind::Colon).is_some() {
            loop {
                interfaces.push(self.parse_type_name()?);
                if self.cursor.match_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        let constraints = self.parse_constraints()?;

        let open = self.cursor.position();
        self.cursor
            .consume(TokenKind::CurlyOpen, CompilationErrorType::UnexpectedToken)?;
        let close = self
            .cursor
            .partner(open)
            .ok_or_else(|| CompilationError::at(&self.cursor.tokens()[open], CompilationErrorType::UnmatchedBracket))?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let inner = TokenCursor::new(self.cursor.tokens(), open + 1, close);
        let outer = std::mem::replace(&mut self.cursor, inner);
        while !self.cursor.is_at_end() {
            let start = self.cursor.position();
            match self.parse_member() {
                Ok(Member::Field(field)) => fields.push(field),
                Ok(Member::Method(method)) => methods.push(method),
                Err(error) => {
                    self.diagnostics.push(error);
                    self.cursor.recover();
                    if self.cursor.position() == start {
                        self.cursor.advance();
                    }
                }
            }
        }
        self.cursor = outer;
        self.cursor.seek(close + 1);

        Ok(TypeSyntax {
            attributes,
            modifiers,
            kind,
            name,
            generic_parameters,
            interfaces,
            constraints,
            fields,
            methods,
        })
    }

    fn parse_member(&mut self) -> ParseResult<Member> {
        let attributes = self.parse_attributes()?;
        let modifiers = self.parse_modifiers();

        let return_type = if self.cursor.match_word("void") {
            None
        } else {
            Some(self.parse_type_name()?)
        };
        let name = self.cursor.identifier()?.clone();

        if self.cursor.check(TokenKind::AngleOpen) || self.cursor.check(TokenKind::RoundOpen) {
            let generic_parameters = self.parse_generic_parameters()?;
            let parameters = self.parse_parameters()?;
            let constraints = self.parse_constraints()?;

            let body = if self.cursor.match_kind(TokenKind::Semicolon).is_some() {
                None
            } else {
                let open = self.cursor.position();
                if !self.cursor.check(TokenKind::CurlyOpen) {
                    return Err(self.cursor.error_here(CompilationErrorType::UnexpectedToken));
                }
                let close = self
                    .cursor
                    .skip_bracket()
                    .ok_or_else(|| self.cursor.error_here(CompilationErrorType::UnmatchedBracket))?;
                Some(open..close + 1)
            };

            return Ok(Member::Method(MethodSyntax {
                attributes,
                modifiers,
                return_type,
                name,
                generic_parameters,
                parameters,
                constraints,
                body,
            }));
        }

        let field_type = return_type
            .ok_or_else(|| CompilationError::at(&name, CompilationErrorType::ExpectedType))?;
        let default = if self.cursor.match_kind(TokenKind::Assignment).is_some() {
            Some(parse_literal(&mut self.cursor)?)
        } else {
            None
        };
        self.cursor
            .consume(TokenKind::Semicolon, CompilationErrorType::ExpectedSemicolon)?;

        Ok(Member::Field(FieldSyntax {
            attributes,
            modifiers,
            field_type,
            name,
            default,
        }))
    }

    fn parse_parameters(&mut self) -> ParseResult<Vec<ParameterSyntax>> {
        self.cursor
            .consume(TokenKind::RoundOpen, CompilationErrorType::UnexpectedToken)?;
        let mut parameters = Vec::new();
        if self.cursor.match_kind(TokenKind::RoundClose).is_some() {
            return Ok(parameters);
        }
        loop {
            let attributes = self.parse_attributes()?;
            let parameter_type = self.parse_type_name()?;
            let name = self.cursor.identifier()?.clone();
            parameters.push(ParameterSyntax {
                attributes,
                parameter_type,
                name,
            });
            if self.cursor.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        if self.cursor.match_kind(TokenKind::RoundClose).is_none() {
            return Err(self.cursor.error_here(CompilationErrorType::ExpectedComma));
        }
        Ok(parameters)
    }
}

enum Member {
    Field(FieldSyntax),
    Method(MethodSyntax),
}

/// `Name`, `A.B.Name`, `Name<Args>`
pub(crate) fn parse_type_name(cursor: &mut TokenCursor<'_>) -> ParseResult<TypeName> {
    if !cursor.check(TokenKind::Word) {
        return Err(cursor.error_here(CompilationErrorType::ExpectedType));
    }
    let token = cursor.advance().clone();
    let mut segments = vec![token.text().to_string()];
    while cursor.check(TokenKind::Dot) && cursor.kind_at(1) == TokenKind::Word {
        cursor.advance();
        segments.push(cursor.advance().text().to_string());
    }

    let mut arguments = Vec::new();
    if cursor.at_matched_open(TokenKind::AngleOpen) {
        cursor.advance();
        loop {
            arguments.push(parse_type_name(cursor)?);
            if cursor.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        cursor.consume(TokenKind::AngleClose, CompilationErrorType::UnexpectedToken)?;
    }

    Ok(TypeName {
        token,
        segments,
        arguments,
    })
}

/// Number, `-` number, `true` or `false`
pub(crate) fn parse_literal(cursor: &mut TokenCursor<'_>) -> ParseResult<LiteralSyntax> {
    let negative = cursor.match_kind(TokenKind::Minus).is_some();
    let token = cursor.peek();
    let is_literal = token.kind == TokenKind::Number
        || (!negative && (token.is_word("true") || token.is_word("false")));
    if !is_literal {
        return Err(cursor.error_here(CompilationErrorType::InvalidLiteral));
    }
    cursor.advance();
    Ok(LiteralSyntax {
        token: token.clone(),
        negative,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse(path: &str, source: &str) -> (FileSyntax, Vec<CompilationError>) {
        let tokens = Arc::new(lex(path, source).unwrap());
        parse_file(path, tokens, "App")
    }

    #[test]
    fn test_namespace_from_path() {
        assert_eq!(namespace_from_path("Shaders/Lit/Basic.nesl"), "Shaders.Lit");
        assert_eq!(namespace_from_path("Shaders\\Basic.nesl"), "Shaders");
        assert_eq!(namespace_from_path("Basic.nesl"), "");
    }

    #[test]
    fn test_type_with_members() {
        let (file, diagnostics) = parse(
            "Kernels/Add.nesl",
            "using System;\n\
             using Buffer = RwBuffer<uint>;\n\
             public struct Add<T> : IThing<T> where T : IAdd<T, T, T> {\n\
                 [Position] public Vector4<float> Position = 1.5;\n\
                 [Kernel(1, 2, 3)] public static void Main(uint a, T b) { if (a < b) { } }\n\
                 public abstract T Get();\n\
             }",
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(file.namespace, "Kernels");
        assert_eq!(file.usings.len(), 1);
        assert_eq!(file.aliases[0].name.text(), "Buffer");

        let ty = &file.types[0];
        assert_eq!(ty.name.text(), "Add");
        assert_eq!(ty.kind, TypeKind::Struct);
        assert_eq!(ty.generic_parameters.len(), 1);
        assert_eq!(ty.interfaces[0].arguments.len(), 1);
        assert_eq!(ty.constraints[0].constraints[0].arguments.len(), 3);
        assert_eq!(ty.fields[0].field_type.arguments[0].segments, vec!["float"]);
        assert!(ty.fields[0].default.is_some());

        let main = &ty.methods[0];
        assert_eq!(main.attributes[0].arguments.len(), 3);
        assert!(main.modifiers.contains(Modifiers::STATIC));
        assert!(main.return_type.is_none());
        assert_eq!(main.parameters.len(), 2);
        assert!(main.body.is_some());
        assert!(ty.methods[1].body.is_none());
    }

    #[test]
    fn test_namespace_mismatch_warning() {
        let (file, diagnostics) = parse("Shaders/A.nesl", "namespace Other; struct A { }");
        assert_eq!(file.namespace, "Other");
        assert_eq!(diagnostics[0].error_type, CompilationErrorType::NamespaceMismatch);
    }

    #[test]
    fn test_unmatched_bracket_is_reported() {
        let (file, diagnostics) = parse("A.nesl", "struct A { void F() { }");
        assert!(file.types.is_empty());
        assert_eq!(diagnostics[0].error_type, CompilationErrorType::UnmatchedBracket);
    }

    #[test]
    fn test_member_error_recovers() {
        let (file, diagnostics) = parse("A.nesl", "struct A { uint = 3; uint B; }");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(file.types[0].fields.len(), 1);
        assert_eq!(file.types[0].fields[0].name.text(), "B");
    }
}
