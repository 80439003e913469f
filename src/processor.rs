use std::collections::VecDeque;
use std::io::{self, Read};

use crate::error::Error;
use crate::macros::MacroTable;
use crate::options::Options;
use crate::parser::{self, Lexer};
use crate::token::{Tags, Token, TokenKind};

/// What the driver does once a token has been handled.
enum Flow {
    /// The token was consumed and becomes the previous token.
    Next,
    /// The pending queue was rewritten; resume from its front.
    Requeue,
}

/// Single-pass rewriter from the brace syntax to indented target text.
///
/// Handlers never recurse: text that has to be re-lexed (macro bodies,
/// continuation lines, literal braces) is tokenized and pushed onto the front
/// of the pending queue, and the driver loop picks it up from there.
pub struct Transpiler<'o> {
    options: &'o Options,
    lexer: Lexer,
    queue: VecDeque<Token>,
    prev: Token,
    out: String,
    depth: usize,
    /// Open string delimiters, innermost last.
    strings: Vec<TokenKind>,
    in_string: bool,
    in_fstring: bool,
    in_rstring: bool,
    /// Code sections currently open inside f-strings.
    fstring_nesting: usize,
    macros: MacroTable,
    expansions: usize,
}

impl<'o> Transpiler<'o> {
    pub fn new(options: &'o Options) -> Self {
        let lexer = Lexer::new(options.dialect);
        let lexer = if options.trace {
            lexer.traced(options.source_label.as_deref())
        } else {
            lexer
        };
        Self {
            options,
            lexer,
            queue: VecDeque::new(),
            prev: Token::default(),
            out: String::new(),
            depth: 0,
            strings: Vec::new(),
            in_string: false,
            in_fstring: false,
            in_rstring: false,
            fstring_nesting: 0,
            macros: MacroTable::new(),
            expansions: 0,
        }
    }

    /// Current block depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// Transpile `source` and return the target text.
    ///
    /// Block depth, macros and string state persist on the transpiler after
    /// the call; use a fresh transpiler per compile.
    pub fn run(&mut self, source: &str) -> Result<String, Error> {
        let source = source.replace("\r\n", "\n").replace('\r', "\n");
        self.queue = self.lexer.tokenize(&source).into();

        while let Some(token) = self.queue.pop_front() {
            match self.step(&token)? {
                Flow::Next => self.prev = token,
                Flow::Requeue => {}
            }
        }

        tracing::debug!(
            tokens = self.lexer.matched(),
            expansions = self.expansions,
            depth = self.depth,
            "transpile finished"
        );
        self.out.push('\n');
        Ok(std::mem::take(&mut self.out))
    }

    fn step(&mut self, token: &Token) -> Result<Flow, Error> {
        match token.kind {
            TokenKind::BlockComment | TokenKind::LineComment | TokenKind::LineStatement => {
                return Ok(self.comment(token));
            }
            TokenKind::EscapedNewline if self.in_string => return Ok(self.continue_line()),
            TokenKind::DoubleBraceOpen => return Ok(self.double_brace(token)),
            TokenKind::SelfClose | TokenKind::LoopSelfClose => return Ok(self.self_close(token)),
            _ => {}
        }

        if token.tags().contains(Tags::MACRO) && self.compilable() {
            return self.directive(token);
        }
        if token.kind == TokenKind::MacroAccess {
            if self.in_triple_string() {
                self.out.push_str(&token.text);
            } else {
                self.out.push_str(&token.text.replace('\n', ""));
            }
            return Ok(Flow::Next);
        }

        if token.kind.is_string_delimiter() && self.may_toggle(token.kind) {
            self.delimit_string(token);
            return Ok(Flow::Next);
        }

        if let Some(flow) = self.block_marker(token) {
            return Ok(flow);
        }
        self.emit(token);
        Ok(Flow::Next)
    }

    fn compilable(&self) -> bool {
        !self.in_string
    }

    fn open_string(&self) -> Option<TokenKind> {
        if self.in_string {
            self.strings.last().copied()
        } else {
            None
        }
    }

    fn in_triple_string(&self) -> bool {
        self.open_string().is_some_and(TokenKind::is_triple_quoted)
    }

    fn splice(&mut self, tokens: Vec<Token>) -> Flow {
        for token in tokens.into_iter().rev() {
            self.queue.push_front(token);
        }
        Flow::Requeue
    }

    fn push_indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str(&self.options.indent_unit);
        }
    }

    fn newline(&mut self) {
        self.out.push('\n');
        self.push_indent(self.depth);
    }

    fn trim_output(&mut self) {
        let len = self.out.trim_end().len();
        self.out.truncate(len);
    }

    /// Add a space unless the output is empty or already ends in whitespace.
    fn space_separate(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with(|c: char| c == ' ' || c == '\n') {
            self.out.push(' ');
        }
    }

    fn comment(&mut self, token: &Token) -> Flow {
        if !self.compilable() {
            // Not a comment inside string content.
            let split = token.text.chars().next().map_or(0, char::len_utf8);
            let mut tokens = self.lexer.tokenize(&token.text[..split]);
            tokens.extend(self.lexer.tokenize(&token.text[split..]));
            return self.splice(tokens);
        }
        if token.kind == TokenKind::LineStatement {
            let body = parser::line_statement_body(&token.text).unwrap_or_default();
            self.out.push('#');
            self.out.push_str(body.trim_end());
            self.newline();
        }
        Flow::Next
    }

    fn continue_line(&mut self) -> Flow {
        match self.queue.pop_front() {
            Some(next) if next.kind == TokenKind::Literal => {
                self.queue.push_front(Token::literal(next.text.trim_start()));
            }
            Some(next) => {
                let tokens = self.lexer.tokenize(next.text.trim_start());
                return self.splice(tokens);
            }
            None => {}
        }
        Flow::Requeue
    }

    fn double_brace(&mut self, token: &Token) -> Flow {
        if self.in_fstring {
            self.out.push_str("{{");
            Flow::Next
        } else if self.in_triple_string() {
            self.out.push_str(&token.text);
            Flow::Next
        } else {
            self.splice(vec![
                Token::new(TokenKind::BlockOpen, "{"),
                Token::new(TokenKind::BlockOpen, "{"),
            ])
        }
    }

    fn self_close(&mut self, token: &Token) -> Flow {
        let looping = token.kind == TokenKind::LoopSelfClose;
        if self.compilable() {
            self.trim_output();
            if looping {
                self.newline();
                self.out.push_str("while True");
            }
            self.out.push_str(":\n");
            self.push_indent(self.depth + 1);
            self.out.push_str("pass");
            self.newline();
            return Flow::Next;
        }

        let interior = parser::self_close_interior(token.kind, &token.text).unwrap_or_default();
        let mut tokens = Vec::new();
        if looping {
            tokens.push(Token::literal("~"));
        }
        tokens.push(Token::new(TokenKind::BlockOpen, "{"));
        tokens.extend(self.lexer.tokenize(interior));
        tokens.push(Token::new(TokenKind::BlockClose, "}"));
        self.splice(tokens)
    }

    fn directive(&mut self, token: &Token) -> Result<Flow, Error> {
        match token.kind {
            TokenKind::MacroDefine => {
                if let Some((name, body)) = parser::macro_definition(&token.text) {
                    tracing::debug!(%name, depth = self.depth, "macro defined");
                    self.macros.define(name, self.depth, body.to_string());
                }
            }
            TokenKind::MacroUndefine => {
                let name = parser::directive_name(token.kind, &token.text).unwrap_or_default();
                self.macros.undefine(&name, self.depth)?;
                tracing::debug!(%name, depth = self.depth, "macro undefined");
            }
            TokenKind::MacroIfdef => {
                let name = parser::directive_name(token.kind, &token.text).unwrap_or_default();
                let defined = self.macros.is_defined(&name, self.depth);
                self.space_separate();
                self.out.push_str(if defined { "True " } else { "False " });
            }
            TokenKind::MacroAccess => {
                let name = parser::directive_name(token.kind, &token.text).unwrap_or_default();
                match self.macros.lookup(&name, self.depth).map(str::to_owned) {
                    Some(body) => {
                        self.count_expansion(&name)?;
                        let tokens = self.lexer.tokenize(&body);
                        return Ok(self.splice(tokens));
                    }
                    None => tracing::debug!(%name, "undefined macro expands to nothing"),
                }
            }
            _ => {}
        }
        Ok(Flow::Next)
    }

    fn count_expansion(&mut self, name: &str) -> Result<(), Error> {
        self.expansions += 1;
        match self.options.expansion_limit {
            Some(limit) if self.expansions > limit => Err(Error::ExpansionLimit {
                name: name.to_string(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    /// Whether `kind` may open or close a string in the current state.
    /// A delimiter never closes a string of another kind.
    fn may_toggle(&self, kind: TokenKind) -> bool {
        use TokenKind::*;
        let open = self.open_string();
        match kind {
            TripleDouble => open != Some(TripleSingle),
            TripleSingle => open != Some(TripleDouble),
            StringDouble => !matches!(open, Some(TripleDouble | TripleSingle | StringSingle)),
            StringSingle => !matches!(open, Some(TripleDouble | TripleSingle | StringDouble)),
            _ => false,
        }
    }

    fn delimit_string(&mut self, token: &Token) {
        let escaped = self.in_string && !self.in_rstring && self.prev.kind == TokenKind::Escape;
        if !escaped {
            if self.strings.last() == Some(&token.kind) {
                self.strings.pop();
            } else {
                self.strings.push(token.kind);
            }
            self.in_string = !self.in_string;
            (self.in_fstring, self.in_rstring) = if self.in_string {
                string_prefix(&self.prev.text)
            } else {
                (false, false)
            };
        }
        self.out.push_str(token.text.trim_start_matches('\n'));
    }

    fn block_marker(&mut self, token: &Token) -> Option<Flow> {
        use TokenKind::*;
        if self.compilable() {
            if self.fstring_nesting == 0 {
                match token.kind {
                    BlockOpen | LoopOpen => self.open_block(token.kind),
                    BlockClose => self.close_block(),
                    Separator => self.newline(),
                    _ => {}
                }
            } else if token.kind == BlockClose {
                // Back into the f-string around this code section.
                self.fstring_nesting -= 1;
                self.in_fstring = true;
                self.in_string = true;
            }
        } else if self.in_fstring {
            match token.kind {
                BlockOpen => {
                    self.in_fstring = false;
                    self.in_string = false;
                    self.fstring_nesting += 1;
                    self.out.push_str(&token.text);
                }
                BlockClose if self.doubled_close() => return Some(Flow::Requeue),
                _ => {}
            }
        }
        None
    }

    fn open_block(&mut self, kind: TokenKind) {
        self.trim_output();
        if kind == TokenKind::LoopOpen {
            self.newline();
            self.out.push_str("while True");
        }
        self.out.push(':');
        self.depth += 1;
        self.newline();
    }

    fn close_block(&mut self) {
        match self.depth.checked_sub(1) {
            Some(depth) => self.depth = depth,
            None => tracing::warn!("block close without a matching open; depth stays at 0"),
        }
        self.macros.purge_above(self.depth);
        self.newline();
    }

    /// Emit `}}` for two closing braces in f-string content, skipping line
    /// breaks between them.
    fn doubled_close(&mut self) -> bool {
        let Some(at) = self.queue.iter().position(|t| t.kind != TokenKind::Newline) else {
            return false;
        };
        if self.queue[at].kind != TokenKind::BlockClose {
            return false;
        }
        for _ in 0..=at {
            self.queue.pop_front();
        }
        self.out.push_str("}}");
        true
    }

    fn emit(&mut self, token: &Token) {
        let tags = token.tags();
        let code = self.compilable();
        if (code && tags.contains(Tags::STRUCTURAL))
            || (tags.contains(Tags::LINE_BREAK) && !self.in_triple_string())
        {
            return;
        }

        let mut text = match token.kind.canonical() {
            Some(canonical) if code && tags.contains(Tags::MAPPED) => canonical.to_string(),
            _ => token.text.clone(),
        };
        if code {
            if tags.contains(Tags::KEYWORD) {
                let word = token.text.replace('\n', "");
                if self.prev.ends_in_word() {
                    self.out.push_str(&word);
                    return;
                }
                text = word + "_";
            }
            if tags.contains(Tags::SHORTHAND) {
                text.push(' ');
                self.space_separate();
            }
        }

        let prev = self.prev.tags();
        let trim = (code && prev.intersects(Tags::TRIM_AFTER | Tags::SHORTHAND))
            || (!self.in_triple_string() && prev.contains(Tags::NEWLINE_LIKE));
        self.out.push_str(if trim { text.trim_start() } else { &text });
    }
}

/// `(f-string, raw)` flags implied by the text right before an opening quote.
fn string_prefix(before: &str) -> (bool, bool) {
    let last = before.chars().next_back().map(|c| c.to_ascii_lowercase());
    let mut tail: Vec<char> = before.chars().rev().take(2).collect();
    tail.reverse();
    let tail: String = tail
        .into_iter()
        .filter(|c| *c != '\n')
        .collect::<String>()
        .to_ascii_lowercase();
    (
        last == Some('f') || tail == "fr",
        last == Some('r') || tail == "rf",
    )
}

/// A reader that yields the transpiled text of its inner reader.
///
/// The whole source has to be seen before any output is known, so the first
/// read drains `inner`.
pub struct TranspilingReader<R: Read> {
    inner: R,
    options: Options,
    output: Option<io::Cursor<Vec<u8>>>,
}

impl<R: Read> TranspilingReader<R> {
    pub fn new(inner: R, options: Options) -> Self {
        Self {
            inner,
            options,
            output: None,
        }
    }

    fn transpile_inner(&mut self) -> io::Result<io::Cursor<Vec<u8>>> {
        let mut source = String::new();
        self.inner.read_to_string(&mut source)?;
        let text = Transpiler::new(&self.options)
            .run(&source)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(io::Cursor::new(text.into_bytes()))
    }
}

impl<R: Read> Read for TranspilingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let output = match self.output.take() {
            Some(output) => output,
            None => self.transpile_inner()?,
        };
        self.output.insert(output).read(buf)
    }
}
