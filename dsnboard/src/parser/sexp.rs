use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("Parse error at position {0}: {1}")]
    ParseError(usize, String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SExp {
    Atom(String),
    List(Vec<SExp>),
}

impl SExp {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExp::Atom(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            SExp::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_atom().and_then(|s| s.parse().ok())
    }

    /// Head atom of a list, e.g. `wire` for `(wire ...)`
    pub fn tag(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(|first| first.as_atom())
    }

    /// Everything after the head atom
    pub fn args(&self) -> &[SExp] {
        match self {
            SExp::List(items) if !items.is_empty() => &items[1..],
            _ => &[],
        }
    }

    /// First child list tagged `key`, returned whole
    pub fn find(&self, key: &str) -> Option<&SExp> {
        self.args().iter().find(|item| item.tag() == Some(key))
    }

    /// All child lists tagged `key`, in declaration order
    pub fn find_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a SExp> + 'a {
        self.args().iter().filter(move |item| item.tag() == Some(key))
    }

    /// Atom value of `(key value)`
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.find(key)
            .and_then(|item| item.args().first())
            .and_then(|v| v.as_atom())
    }

    /// Leading atom arguments, stopping at the first nested list
    pub fn leading_atoms(&self) -> Vec<&str> {
        self.args().iter().map_while(|item| item.as_atom()).collect()
    }
}

impl fmt::Display for SExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExp::Atom(s) => {
                if s.contains(' ') || s.is_empty() || s.contains('(') || s.contains(')') {
                    write!(f, "\"{}\"", s.replace('"', "\\\""))
                } else {
                    write!(f, "{}", s)
                }
            }
            SExp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Reader for Specctra-style S-expressions.
///
/// Specctra files declare their quote character with `(string_quote ")`,
/// where the bare `"` is a token rather than the start of a string; the
/// reader takes the single character after `string_quote` literally.
pub struct SExpParser<'a> {
    chars: Peekable<CharIndices<'a>>,
    quote: char,
}

impl<'a> SExpParser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            quote: '"',
        }
    }

    /// Read exactly one root expression.
    pub fn parse(&mut self) -> Result<SExp, ParseError> {
        let root = self.parse_sexp()?;
        self.skip_whitespace();
        match self.position() {
            Some(pos) => Err(ParseError::ParseError(
                pos,
                "trailing content after root expression".to_string(),
            )),
            None => Ok(root),
        }
    }

    fn parse_sexp(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();
        match self.chars.peek().copied() {
            None => Err(ParseError::UnexpectedEof),
            Some((_, '(')) => self.parse_list(),
            Some((pos, ')')) => Err(ParseError::ParseError(pos, "unbalanced ')'".to_string())),
            Some((_, ch)) if ch == self.quote => self.parse_string(),
            Some(_) => self.parse_symbol(),
        }
    }

    fn parse_list(&mut self) -> Result<SExp, ParseError> {
        self.chars.next();
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                None => return Err(ParseError::UnexpectedEof),
                Some((_, ')')) => {
                    self.chars.next();
                    return Ok(SExp::List(items));
                }
                Some(_) => {}
            }

            if matches!(items.as_slice(), [SExp::Atom(tag)] if tag == "string_quote") {
                if let Some((_, quote)) = self.chars.next() {
                    self.quote = quote;
                    items.push(SExp::Atom(quote.to_string()));
                }
                continue;
            }

            items.push(self.parse_sexp()?);
        }
    }

    fn parse_string(&mut self) -> Result<SExp, ParseError> {
        let start = self.position().unwrap_or_default();
        self.chars.next();
        let mut s = String::new();

        while let Some((_, ch)) = self.chars.next() {
            if ch == self.quote {
                return Ok(SExp::Atom(s));
            }
            if ch != '\\' {
                s.push(ch);
                continue;
            }
            match self.chars.next() {
                Some((_, 'n')) => s.push('\n'),
                Some((_, 't')) => s.push('\t'),
                Some((_, 'r')) => s.push('\r'),
                Some((_, other)) => s.push(other),
                None => break,
            }
        }

        Err(ParseError::ParseError(start, "unterminated string".to_string()))
    }

    fn parse_symbol(&mut self) -> Result<SExp, ParseError> {
        let mut s = String::new();
        while let Some(ch) = self
            .chars
            .next_if(|&(_, c)| !(c.is_whitespace() || c == '(' || c == ')'))
            .map(|(_, c)| c)
        {
            s.push(ch);
        }

        if s.is_empty() {
            Err(ParseError::UnexpectedToken("empty symbol".to_string()))
        } else {
            Ok(SExp::Atom(s))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    /// Byte offset of the next unread character
    fn position(&mut self) -> Option<usize> {
        self.chars.peek().map(|&(pos, _)| pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> SExp {
        SExpParser::new(input).parse().unwrap()
    }

    #[test]
    fn test_parse_nested() {
        let result = parse("(a (b c) d)");
        let items = result.as_list().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], SExp::Atom("a".to_string()));
        assert_eq!(items[1].args().len(), 1);
    }

    #[test]
    fn test_string_quote_directive() {
        let result =
            parse(r#"(pcb "my board.dsn" (parser (string_quote ") (host_cad "KiCad's Pcbnew")))"#);
        assert_eq!(result.args()[0].as_atom(), Some("my board.dsn"));

        let parser = result.find("parser").unwrap();
        assert_eq!(parser.value_of("string_quote"), Some("\""));
        assert_eq!(parser.value_of("host_cad"), Some("KiCad's Pcbnew"));
    }

    #[test]
    fn test_find_all_and_leading_atoms() {
        let result = parse("(net GND (pins R1-1 C1-2) (pins U1-4))");
        assert_eq!(result.leading_atoms(), vec!["GND"]);
        assert_eq!(result.find_all("pins").count(), 2);
        let pins = result.find("pins").unwrap();
        assert_eq!(pins.leading_atoms(), vec!["R1-1", "C1-2"]);
    }

    #[test]
    fn test_numeric_atoms() {
        let result = parse("(place R1 1000 -500.5 front 90)");
        assert_eq!(result.args()[2].as_f64(), Some(-500.5));
        assert_eq!(result.args()[3].as_f64(), None);
    }

    #[test]
    fn test_unterminated_list() {
        let err = SExpParser::new("(a (b c)").parse().unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof));
    }

    #[test]
    fn test_trailing_content_rejected() {
        let err = SExpParser::new("(a) (b)").parse().unwrap_err();
        assert!(matches!(err, ParseError::ParseError(_, _)));
    }

    #[test]
    fn test_display_roundtrip() {
        let result = parse(r#"(padstack "Via[0-1]_600:300 um" (attach off))"#);
        assert_eq!(
            result.to_string(),
            r#"(padstack "Via[0-1]_600:300 um" (attach off))"#
        );
    }
}
