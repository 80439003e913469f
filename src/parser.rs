use std::collections::HashMap;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::options::Dialect;
use crate::token::{Tags, Token, TokenKind, is_word_char};

#[derive(Parser)]
#[grammar = "src/grammar.pest"]
pub struct NestParser;

/// Constraint on the character immediately before a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookbehind {
    Any,
    /// Not preceded by a backslash.
    Unescaped,
    /// A match starting with a word character must not continue a word.
    WordStart,
}

impl Lookbehind {
    fn admits(self, before: Option<char>, matched: &str) -> bool {
        match self {
            Lookbehind::Any => true,
            Lookbehind::Unescaped => before != Some('\\'),
            Lookbehind::WordStart => {
                matched.starts_with('\n') || !before.is_some_and(is_word_char)
            }
        }
    }
}

/// How much of the remaining input a pattern may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    /// A few significant characters, with any whitespace or underscores
    /// between them.
    Short,
    /// Unbounded, and only tried where the short `head` rule matches.
    Open { head: Rule },
}

/// One Pattern Table entry.
#[derive(Debug, Clone, Copy)]
pub struct Pattern {
    pub kind: TokenKind,
    pub rule: Rule,
    /// Every character a match can begin with.
    pub first: &'static str,
    pub lookbehind: Lookbehind,
    pub reach: Reach,
}

const fn pattern(kind: TokenKind, rule: Rule, first: &'static str) -> Pattern {
    Pattern {
        kind,
        rule,
        first,
        lookbehind: Lookbehind::Any,
        reach: Reach::Short,
    }
}

const fn guarded(
    kind: TokenKind,
    rule: Rule,
    first: &'static str,
    lookbehind: Lookbehind,
) -> Pattern {
    Pattern {
        kind,
        rule,
        first,
        lookbehind,
        reach: Reach::Short,
    }
}

const fn open(kind: TokenKind, rule: Rule, first: &'static str, head: Rule) -> Pattern {
    Pattern {
        kind,
        rule,
        first,
        lookbehind: Lookbehind::Any,
        reach: Reach::Open { head },
    }
}

/// The Pattern Table. Declaration order is match priority.
pub static PATTERNS: &[Pattern] = {
    use Lookbehind::{Unescaped, WordStart};
    use TokenKind as K;
    &[
        pattern(K::EscapedEscape, Rule::escaped_escape, "\\"),
        pattern(K::EscapedNewline, Rule::escaped_newline, "\\"),
        pattern(K::Escape, Rule::escape, "\\"),
        guarded(K::TripleDouble, Rule::triple_double, "\"", Unescaped),
        guarded(K::TripleSingle, Rule::triple_single, "'", Unescaped),
        pattern(K::StringDouble, Rule::string_double, "\n\""),
        pattern(K::StringSingle, Rule::string_single, "\n'"),
        pattern(K::DictOpen, Rule::dict_open, "-"),
        pattern(K::DictClose, Rule::dict_close, "}"),
        pattern(K::DoubleBraceOpen, Rule::double_brace_open, "{"),
        open(K::SelfClose, Rule::self_close, "{", Rule::self_close_head),
        open(K::LoopSelfClose, Rule::loop_self_close, "~", Rule::loop_self_close_head),
        pattern(K::LoopOpen, Rule::loop_open, "~"),
        pattern(K::BlockOpen, Rule::block_open, "{"),
        pattern(K::BlockClose, Rule::block_close, "}"),
        guarded(K::KwAnd, Rule::kw_and, "\na", WordStart),
        guarded(K::KwOr, Rule::kw_or, "\no", WordStart),
        guarded(K::KwCpdef, Rule::kw_cpdef, "\nc", WordStart),
        guarded(K::KwCdef, Rule::kw_cdef, "\nc", WordStart),
        guarded(K::KwNot, Rule::kw_not, "\nn", WordStart),
        guarded(K::KwIs, Rule::kw_is, "\ni", WordStart),
        guarded(K::KwDef, Rule::kw_def, "\nd", WordStart),
        guarded(K::KwLambda, Rule::kw_lambda, "\nl", WordStart),
        guarded(K::KwIn, Rule::kw_in, "\ni", WordStart),
        guarded(K::KwReturn, Rule::kw_return, "\nr", WordStart),
        guarded(K::KwYield, Rule::kw_yield, "\ny", WordStart),
        guarded(K::KwCase, Rule::kw_case, "\nc", WordStart),
        guarded(K::KwDel, Rule::kw_del, "\nd", WordStart),
        guarded(K::KwPass, Rule::kw_pass, "\np", WordStart),
        pattern(K::Newline, Rule::newline, "\n"),
        pattern(K::Return, Rule::return_arrow, "="),
        pattern(K::Yield, Rule::yield_arrow, ":"),
        pattern(K::NativeSemicolon, Rule::native_semicolon, ","),
        pattern(K::NativeAssign, Rule::native_assign, "<"),
        pattern(K::Increment, Rule::increment, "+"),
        pattern(K::Decrement, Rule::decrement, "-"),
        pattern(K::And, Rule::and_op, "&"),
        pattern(K::Or, Rule::or_op, "|"),
        pattern(K::Is, Rule::is_op, "="),
        pattern(K::IsNot, Rule::is_not_op, "!"),
        pattern(K::Cpdef, Rule::cpdef_op, "~"),
        pattern(K::Cdef, Rule::cdef_op, "$"),
        pattern(K::Def, Rule::def_op, ":"),
        pattern(K::ReturnType, Rule::return_type, ">"),
        pattern(K::In, Rule::in_op, "-"),
        pattern(K::NotIn, Rule::not_in_op, "!"),
        pattern(K::Del, Rule::del_op, "~"),
        pattern(K::Lambda, Rule::lambda_op, ";"),
        pattern(K::Separator, Rule::separator, ";"),
        pattern(K::Not, Rule::not_op, "!"),
        open(K::BlockComment, Rule::block_comment, "/", Rule::block_comment_head),
        open(K::LineComment, Rule::line_comment, "/", Rule::line_comment_head),
        open(K::LineStatement, Rule::line_statement, "/", Rule::line_statement_head),
        pattern(K::IntDiv, Rule::int_div, "~"),
        pattern(K::Case, Rule::case_op, "?"),
        open(K::MacroDefine, Rule::macro_define, "#", Rule::macro_define_head),
        open(K::MacroUndefine, Rule::macro_undefine, "#", Rule::macro_undefine_head),
        open(K::MacroIfdef, Rule::macro_ifdef, "#", Rule::macro_ifdef_head),
        open(K::MacroAccess, Rule::macro_access, "$", Rule::macro_access_head),
        pattern(K::Hash, Rule::hash, "#"),
    ]
};

/// Significant characters a short pattern may inspect, lookahead included.
const SHORT_REACH: usize = 8;

/// First window tried for an open-ended pattern, in bytes.
const OPEN_WINDOW: usize = 256;

impl Pattern {
    /// Length of this pattern's match at the start of `rest`.
    ///
    /// pest indexes every line of the text it is given, so patterns never see
    /// more of `rest` than they can reach.
    fn match_len(&self, rest: &str) -> Option<usize> {
        match self.reach {
            Reach::Short => match_len(self.rule, short_window(rest)),
            Reach::Open { head } => {
                match_len(head, short_window(rest))?;
                let mut size = OPEN_WINDOW;
                loop {
                    let window = prefix(rest, size);
                    let whole = window.len() == rest.len();
                    // A match that stops before the window edge never looked past it.
                    match match_len(self.rule, window) {
                        Some(len) if len < window.len() || whole => return Some(len),
                        None if whole => return None,
                        _ => size = size.saturating_mul(2),
                    }
                }
            }
        }
    }
}

/// The shortest prefix of `rest` holding `SHORT_REACH` characters other than
/// whitespace and `_`. Short rules consume those only in unbounded runs, so
/// they match the same here as on all of `rest`.
fn short_window(rest: &str) -> &str {
    let mut seen = 0;
    for (i, c) in rest.char_indices() {
        if c.is_whitespace() || c == '_' {
            continue;
        }
        seen += 1;
        if seen == SHORT_REACH {
            return &rest[..i + c.len_utf8()];
        }
    }
    rest
}

/// At least `size` bytes of `rest`, ending on a char boundary.
fn prefix(rest: &str, size: usize) -> &str {
    let mut end = size.min(rest.len());
    while !rest.is_char_boundary(end) {
        end += 1;
    }
    &rest[..end]
}

/// Scans text against the Pattern Table.
///
/// A lexer keeps running counters across calls so that re-lexed text
/// continues the trace numbering of the compile it belongs to.
#[derive(Debug)]
pub struct Lexer {
    /// Patterns keyed by the character they start with, in table order.
    dispatch: HashMap<char, Vec<&'static Pattern>>,
    trace: bool,
    label: Option<String>,
    matched: usize,
}

impl Lexer {
    pub fn new(dialect: Dialect) -> Self {
        let mut dispatch: HashMap<char, Vec<&'static Pattern>> = HashMap::new();
        for pattern in PATTERNS
            .iter()
            .filter(|p| dialect == Dialect::Extended || !p.kind.tags().contains(Tags::EXTENDED))
        {
            for c in pattern.first.chars() {
                dispatch.entry(c).or_default().push(pattern);
            }
        }
        Self {
            dispatch,
            trace: false,
            label: None,
            matched: 0,
        }
    }

    /// Emit a `nestc::trace` event for every token produced.
    pub fn traced(mut self, label: Option<&str>) -> Self {
        self.trace = true;
        self.label = label.map(str::to_owned);
        self
    }

    /// Number of tokens produced so far.
    pub fn matched(&self) -> usize {
        self.matched
    }

    /// Split `input` into tokens whose texts concatenate back to `input`.
    pub fn tokenize(&mut self, input: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut start = 0;
        let mut pos = 0;

        while pos < input.len() {
            match self.match_at(input, pos) {
                Some((kind, len)) => {
                    if start < pos {
                        self.push(&mut tokens, Token::literal(&input[start..pos]), input.len(), pos);
                    }
                    pos += len;
                    self.push(&mut tokens, Token::new(kind, &input[pos - len..pos]), input.len(), pos);
                    start = pos;
                }
                None => {
                    pos += input[pos..].chars().next().map_or(1, char::len_utf8);
                }
            }
        }
        if start < input.len() {
            self.push(&mut tokens, Token::literal(&input[start..]), input.len(), input.len());
        }
        tokens
    }

    fn match_at(&self, input: &str, pos: usize) -> Option<(TokenKind, usize)> {
        let rest = &input[pos..];
        let candidates = self.dispatch.get(&rest.chars().next()?)?;
        let before = input[..pos].chars().next_back();
        candidates.iter().find_map(|p| {
            let len = p.match_len(rest)?;
            (len > 0 && p.lookbehind.admits(before, &rest[..len])).then_some((p.kind, len))
        })
    }

    fn push(&mut self, tokens: &mut Vec<Token>, token: Token, total: usize, consumed: usize) {
        self.matched += 1;
        if self.trace {
            let percent = consumed as f64 / total as f64 * 100.0;
            let label = self.label.as_deref().map(|l| format!(" {l}")).unwrap_or_default();
            tracing::info!(
                target: "nestc::trace",
                "tokenmatch \u{2116}{}; {percent:.2}% of string{label} parsed",
                self.matched
            );
        }
        tokens.push(token);
    }
}

/// Tokenize with a throwaway lexer.
pub fn tokenize(input: &str, dialect: Dialect) -> Vec<Token> {
    Lexer::new(dialect).tokenize(input)
}

fn match_len(rule: Rule, input: &str) -> Option<usize> {
    let pair = NestParser::parse(rule, input).ok()?.next()?;
    Some(pair.as_str().len())
}

fn parse_one(rule: Rule, text: &str) -> Option<Pair<'_, Rule>> {
    NestParser::parse(rule, text).ok()?.next()
}

fn inner_str<'a>(pair: Pair<'a, Rule>, rule: Rule) -> Option<&'a str> {
    pair.into_inner()
        .find(|p| p.as_rule() == rule)
        .map(|p| p.as_str())
}

/// Macro names may be spelled across lines; the breaks are not part of the name.
fn macro_name(raw: Option<&str>) -> String {
    raw.unwrap_or_default().replace('\n', "")
}

/// Name and raw body of a `#NAME#!body!#` definition.
pub fn macro_definition(text: &str) -> Option<(String, &str)> {
    let pair = parse_one(Rule::macro_define, text)?;
    let mut name = None;
    let mut body = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::macro_name => name = Some(inner.as_str()),
            Rule::macro_body => body = Some(inner.as_str()),
            _ => {}
        }
    }
    Some((macro_name(name), body.unwrap_or_default()))
}

/// Name referenced by an undefine, existence test or access directive.
pub fn directive_name(kind: TokenKind, text: &str) -> Option<String> {
    let rule = match kind {
        TokenKind::MacroUndefine => Rule::macro_undefine,
        TokenKind::MacroIfdef => Rule::macro_ifdef,
        TokenKind::MacroAccess => Rule::macro_access,
        _ => return None,
    };
    let pair = parse_one(rule, text)?;
    Some(macro_name(inner_str(pair, Rule::macro_name)))
}

/// Payload of a `/|...|/` line statement.
pub fn line_statement_body(text: &str) -> Option<&str> {
    inner_str(parse_one(Rule::line_statement, text)?, Rule::line_statement_body)
}

/// Text between the braces of a self-closing block.
pub fn self_close_interior(kind: TokenKind, text: &str) -> Option<&str> {
    let rule = match kind {
        TokenKind::SelfClose => Rule::self_close,
        TokenKind::LoopSelfClose => Rule::loop_self_close,
        _ => return None,
    };
    inner_str(parse_one(rule, text)?, Rule::self_close_interior)
}
