//! Minimal S-expression reader for KiCad board files
//!
//! KiCad stores boards as nested lists of bare atoms and double-quoted
//! strings. Only the subset needed to read footprint placement is
//! interpreted; everything else is kept as a generic tree.

#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    List(Vec<Sexpr>),
    Atom(String),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason} at byte {offset}")]
pub struct SexprError {
    pub offset: usize,
    pub reason: &'static str,
}

impl Sexpr {
    pub fn as_list(&self) -> Option<&[Sexpr]> {
        match self {
            Sexpr::List(items) => Some(items),
            _ => None,
        }
    }

    /// Bare symbol text, e.g. `F.Cu` or `smd`
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexpr::Atom(a) => Some(a),
            _ => None,
        }
    }

    /// Text of either a quoted string or a bare atom
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Sexpr::Atom(s) | Sexpr::Str(s) => Some(s),
            Sexpr::List(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_atom().and_then(|a| a.parse().ok())
    }

    /// Leading atom of a list, e.g. `footprint` for `(footprint ...)`
    pub fn head(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(Sexpr::as_atom)
    }

    /// Element `index` of a list, counting the head as 0
    pub fn get(&self, index: usize) -> Option<&Sexpr> {
        self.as_list().and_then(|items| items.get(index))
    }

    /// Direct child lists whose head is `name`
    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Sexpr> + 'n
    where
        'a: 'n,
    {
        self.as_list()
            .unwrap_or(&[])
            .iter()
            .filter(move |child| child.head() == Some(name))
    }

    /// First direct child list whose head is `name`
    pub fn child(&self, name: &str) -> Option<&Sexpr> {
        self.as_list()?.iter().find(|child| child.head() == Some(name))
    }
}

/// Parse one complete S-expression document
pub fn parse(text: &str) -> Result<Sexpr, SexprError> {
    let mut parser = Parser {
        bytes: text.as_bytes(),
        text,
        pos: 0,
    };

    parser.skip_whitespace();
    if parser.pos >= parser.bytes.len() {
        return Err(parser.error("empty document"));
    }

    let root = parser.parse_expr()?;
    parser.skip_whitespace();
    if parser.pos < parser.bytes.len() {
        return Err(parser.error("trailing input after root expression"));
    }

    Ok(root)
}

struct Parser<'a> {
    bytes: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &'static str) -> SexprError {
        SexprError {
            offset: self.pos,
            reason,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn parse_expr(&mut self) -> Result<Sexpr, SexprError> {
        match self.bytes.get(self.pos) {
            Some(b'(') => self.parse_list(),
            Some(b')') => Err(self.error("unexpected closing parenthesis")),
            Some(b'"') => self.parse_string(),
            Some(_) => Ok(self.parse_atom()),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_list(&mut self) -> Result<Sexpr, SexprError> {
        let open = self.pos;
        self.pos += 1;
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();
            match self.bytes.get(self.pos) {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Sexpr::List(items));
                }
                Some(_) => items.push(self.parse_expr()?),
                None => {
                    return Err(SexprError {
                        offset: open,
                        reason: "unbalanced parenthesis",
                    })
                }
            }
        }
    }

    fn parse_string(&mut self) -> Result<Sexpr, SexprError> {
        let open = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut run_start = self.pos;

        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b'"' => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    return Ok(Sexpr::Str(out));
                }
                b'\\' => {
                    out.push_str(&self.text[run_start..self.pos]);
                    let escaped = match self.bytes.get(self.pos + 1) {
                        Some(b'n') => Some('\n'),
                        Some(b't') => Some('\t'),
                        Some(b'r') => Some('\r'),
                        Some(b'"') => Some('"'),
                        Some(b'\\') => Some('\\'),
                        Some(_) => None,
                        None => break,
                    };
                    match escaped {
                        Some(c) => {
                            out.push(c);
                            self.pos += 2;
                        }
                        // unknown escapes are kept verbatim
                        None => {
                            out.push('\\');
                            self.pos += 1;
                        }
                    }
                    run_start = self.pos;
                }
                _ => self.pos += 1,
            }
        }

        Err(SexprError {
            offset: open,
            reason: "unterminated string",
        })
    }

    fn parse_atom(&mut self) -> Sexpr {
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b.is_ascii_whitespace() || b == b'(' || b == b')' || b == b'"' {
                break;
            }
            self.pos += 1;
        }
        Sexpr::Atom(self.text[start..self.pos].to_string())
    }
}
