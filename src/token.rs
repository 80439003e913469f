//! Tokens produced by the lexer and consumed by the transpiler.
//!
//! A token is a span of source text plus its [`TokenKind`]. The kind is the
//! token's stable identity: it selects the category [`Tags`] that drive the
//! engine and, for shorthand spellings, the canonical target text.

use bitflags::bitflags;

bitflags! {
    /// Category tags attached to every token kind.
    ///
    /// Looked up once per token from [`TokenKind::tags`], so the engine can
    /// branch on capabilities instead of enumerating kinds.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct Tags: u16 {
        /// Consumed by the engine in code position; never echoed there.
        const STRUCTURAL = 1 << 0;
        /// A raw line break. Only echoed inside triple-quoted strings.
        const LINE_BREAK = 1 << 1;
        /// Strips the leading whitespace of the next token in code.
        const TRIM_AFTER = 1 << 2;
        /// Replaced by its canonical text in code.
        const MAPPED = 1 << 3;
        /// Only recognised by the extended dialect.
        const EXTENDED = 1 << 4;
        /// Opens or closes a string literal.
        const STRING = 1 << 5;
        /// Keyword spelling that gets an underscore appended unless it
        /// continues a preceding word.
        const KEYWORD = 1 << 6;
        /// Operator shorthand, emitted as a spaced word.
        const SHORTHAND = 1 << 7;
        /// Macro directive.
        const MACRO = 1 << 8;
        /// Strips the leading whitespace of the next token outside
        /// triple-quoted strings.
        const NEWLINE_LIKE = 1 << 9;
    }
}

/// Identity of a token. `Literal` marks unmatched text between patterns.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(u8)]
pub enum TokenKind {
    Literal,
    EscapedEscape,
    EscapedNewline,
    Escape,
    TripleDouble,
    TripleSingle,
    StringDouble,
    StringSingle,
    DictOpen,
    DictClose,
    DoubleBraceOpen,
    SelfClose,
    LoopSelfClose,
    LoopOpen,
    BlockOpen,
    BlockClose,
    KwAnd,
    KwOr,
    KwCpdef,
    KwCdef,
    KwNot,
    KwIs,
    KwDef,
    KwLambda,
    KwIn,
    KwReturn,
    KwYield,
    KwCase,
    KwDel,
    KwPass,
    Newline,
    Return,
    Yield,
    NativeSemicolon,
    NativeAssign,
    Increment,
    Decrement,
    And,
    Or,
    Is,
    IsNot,
    Cpdef,
    Cdef,
    Def,
    ReturnType,
    In,
    NotIn,
    Del,
    Lambda,
    Separator,
    Not,
    BlockComment,
    LineComment,
    LineStatement,
    IntDiv,
    Case,
    MacroDefine,
    MacroUndefine,
    MacroIfdef,
    MacroAccess,
    Hash,
}

impl TokenKind {
    /// Category tags for this kind.
    pub const fn tags(self) -> Tags {
        use TokenKind::*;
        const BLOCK: Tags = Tags::STRUCTURAL.union(Tags::TRIM_AFTER);
        const OPERATOR: Tags = Tags::SHORTHAND.union(Tags::MAPPED);

        match self {
            Literal | EscapedEscape | Escape | DoubleBraceOpen => Tags::empty(),
            EscapedNewline => Tags::TRIM_AFTER.union(Tags::NEWLINE_LIKE),
            TripleDouble | TripleSingle | StringDouble | StringSingle => Tags::STRING,
            DictOpen | DictClose | NativeSemicolon | NativeAssign | Increment | Decrement
            | IntDiv => Tags::MAPPED,
            SelfClose | LoopSelfClose | LoopOpen | BlockOpen | BlockClose | Separator => BLOCK,
            KwCpdef | KwCdef => Tags::KEYWORD.union(Tags::EXTENDED),
            KwAnd | KwOr | KwNot | KwIs | KwDef | KwLambda | KwIn | KwReturn | KwYield
            | KwCase | KwDel | KwPass => Tags::KEYWORD,
            Newline => Tags::LINE_BREAK
                .union(Tags::TRIM_AFTER)
                .union(Tags::NEWLINE_LIKE),
            Cpdef | Cdef => OPERATOR.union(Tags::EXTENDED),
            Return | Yield | And | Or | Is | IsNot | Def | ReturnType | In | NotIn | Del
            | Lambda | Not | Case => OPERATOR,
            BlockComment | LineComment | LineStatement => Tags::TRIM_AFTER,
            MacroDefine | MacroUndefine | MacroIfdef | MacroAccess => Tags::MACRO,
            Hash => Tags::STRUCTURAL,
        }
    }

    /// Target-language text for mapped kinds.
    pub const fn canonical(self) -> Option<&'static str> {
        use TokenKind::*;
        let text = match self {
            DictOpen => "{",
            DictClose => "}",
            NativeSemicolon => ";",
            NativeAssign => ":=",
            And => "and",
            Or => "or",
            Not => "not",
            Is => "is",
            IsNot => "is not",
            Def => "def",
            In => "in",
            Case => "case",
            NotIn => "not in",
            Return => "return",
            Lambda => "lambda",
            Del => "del",
            Increment => "+=1",
            Decrement => "-=1",
            Cpdef => "cpdef",
            Cdef => "cdef",
            Yield => "yield",
            IntDiv => "//",
            ReturnType => "->",
            _ => return None,
        };
        Some(text)
    }

    pub fn is_string_delimiter(self) -> bool {
        self.tags().contains(Tags::STRING)
    }

    pub fn is_triple_quoted(self) -> bool {
        matches!(self, TokenKind::TripleDouble | TokenKind::TripleSingle)
    }
}

/// A classified span of source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// Unmatched text passed through verbatim.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Literal, text)
    }

    pub fn tags(&self) -> Tags {
        self.kind.tags()
    }

    /// Whether the text, ignoring trailing line breaks, ends in a word
    /// character.
    pub fn ends_in_word(&self) -> bool {
        self.text
            .trim_end_matches('\n')
            .chars()
            .next_back()
            .is_some_and(is_word_char)
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::literal(String::new())
    }
}

/// Word characters as understood by keyword boundaries and macro names.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorthand_implies_mapped() {
        for kind in [TokenKind::And, TokenKind::Def, TokenKind::Cdef, TokenKind::Case] {
            assert!(kind.tags().contains(Tags::SHORTHAND | Tags::MAPPED));
            assert!(kind.canonical().is_some());
        }
    }

    #[test]
    fn test_every_mapped_kind_has_canonical_text() {
        use TokenKind::*;
        let all = [
            DictOpen, DictClose, NativeSemicolon, NativeAssign, Increment, Decrement, IntDiv,
            Return, Yield, And, Or, Is, IsNot, Cpdef, Cdef, Def, ReturnType, In, NotIn, Del,
            Lambda, Not, Case,
        ];
        for kind in all {
            assert!(kind.tags().contains(Tags::MAPPED), "{kind:?}");
            assert!(kind.canonical().is_some(), "{kind:?}");
        }
        assert_eq!(BlockOpen.canonical(), None);
        assert_eq!(KwAnd.canonical(), None);
    }

    #[test]
    fn test_literal_has_no_tags() {
        assert!(Token::literal("x").tags().is_empty());
        assert!(Token::default().text.is_empty());
    }

    #[test]
    fn test_extended_kinds() {
        assert!(TokenKind::KwCdef.tags().contains(Tags::EXTENDED));
        assert!(TokenKind::Cpdef.tags().contains(Tags::EXTENDED));
        assert!(!TokenKind::Def.tags().contains(Tags::EXTENDED));
    }

    #[test]
    fn test_ends_in_word() {
        assert!(Token::literal("foo\n\n").ends_in_word());
        assert!(Token::literal("x_").ends_in_word());
        assert!(!Token::literal("x ").ends_in_word());
        assert!(!Token::default().ends_in_word());
    }
}
