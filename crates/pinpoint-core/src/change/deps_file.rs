//! Parser for gclient DEPS files.
//!
//! DEPS files are Python literals: a sequence of `name = expr` assignments
//! where `expr` is built from dicts, lists, strings, `Var('name')` lookups and
//! `+` concatenation. Only the `vars`, `deps` and `deps_os` assignments matter
//! for pin extraction; everything else is parsed and discarded.

use std::collections::BTreeMap;

use crate::error::{ChangeError, ChangeResult};

/// One pinned dependency: checkout path, repository URL and revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepsEntry {
    pub path: String,
    pub url: String,
    pub revision: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    Plus,
    Equals,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    None,
    List(Vec<Value>),
    Dict(Vec<(String, Value)>),
}

impl Value {
    fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

fn error(message: impl Into<String>) -> ChangeError {
    ChangeError::DepsFile(message.into())
}

fn tokenize(src: &str) -> ChangeResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(e @ ('\\' | '\'' | '"')) => s.push(e),
                            Some(e) => {
                                s.push('\\');
                                s.push(e);
                            }
                            None => return Err(error("unterminated string")),
                        },
                        Some(c) if c == quote => break,
                        Some(c) => s.push(c),
                        None => return Err(error("unterminated string")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let n = digits
                    .parse()
                    .map_err(|_| error(format!("integer out of range: {digits}")))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if !(d.is_alphanumeric() || d == '_') {
                        break;
                    }
                    ident.push(d);
                    chars.next();
                }
                tokens.push(Token::Ident(ident));
            }
            _ => {
                let token = match c {
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ':' => Token::Colon,
                    ',' => Token::Comma,
                    '+' => Token::Plus,
                    '=' => Token::Equals,
                    other => return Err(error(format!("unexpected character {other:?}"))),
                };
                tokens.push(token);
                chars.next();
            }
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    vars: BTreeMap<String, Value>,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> ChangeResult<()> {
        let token = self.advance();
        if token == expected {
            Ok(())
        } else {
            Err(error(format!("expected {expected:?}, found {token:?}")))
        }
    }

    fn assignments(&mut self) -> ChangeResult<BTreeMap<String, Value>> {
        let mut globals = BTreeMap::new();
        while *self.peek() != Token::Eof {
            let name = match self.advance() {
                Token::Ident(name) => name,
                other => return Err(error(format!("expected assignment, found {other:?}"))),
            };
            self.expect(Token::Equals)?;
            let value = self.expr()?;
            if name == "vars" {
                if let Value::Dict(entries) = &value {
                    self.vars = entries.iter().cloned().collect();
                }
            }
            globals.insert(name, value);
        }
        Ok(globals)
    }

    fn expr(&mut self) -> ChangeResult<Value> {
        let mut value = self.primary()?;
        while *self.peek() == Token::Plus {
            self.advance();
            let rhs = self.primary()?;
            value = match (value, rhs) {
                (Value::Str(a), Value::Str(b)) => Value::Str(a + &b),
                (Value::List(mut a), Value::List(b)) => {
                    a.extend(b);
                    Value::List(a)
                }
                (a, b) => return Err(error(format!("can't add {a:?} and {b:?}"))),
            };
        }
        Ok(value)
    }

    fn primary(&mut self) -> ChangeResult<Value> {
        match self.advance() {
            Token::Str(mut s) => {
                // Adjacent literals concatenate.
                while let Token::Str(next) = self.peek().clone() {
                    self.advance();
                    s.push_str(&next);
                }
                Ok(Value::Str(s))
            }
            Token::Int(n) => Ok(Value::Int(n)),
            Token::LBrace => self.dict(),
            Token::LBracket => self.list(),
            Token::LParen => self.paren(),
            Token::Ident(ident) => match ident.as_str() {
                "True" => Ok(Value::Bool(true)),
                "False" => Ok(Value::Bool(false)),
                "None" => Ok(Value::None),
                "Var" => {
                    let name = self.call_argument()?;
                    self.vars
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| error(format!("undefined var {name:?}")))
                }
                "Str" => Ok(Value::Str(self.call_argument()?)),
                other => Err(error(format!("unsupported name {other:?}"))),
            },
            other => Err(error(format!("unexpected token {other:?}"))),
        }
    }

    fn call_argument(&mut self) -> ChangeResult<String> {
        self.expect(Token::LParen)?;
        let argument = match self.expr()? {
            Value::Str(s) => s,
            other => return Err(error(format!("expected string argument, found {other:?}"))),
        };
        self.expect(Token::RParen)?;
        Ok(argument)
    }

    fn dict(&mut self) -> ChangeResult<Value> {
        let mut entries = Vec::new();
        loop {
            if *self.peek() == Token::RBrace {
                self.advance();
                return Ok(Value::Dict(entries));
            }
            let key = match self.expr()? {
                Value::Str(s) => s,
                other => return Err(error(format!("unsupported dict key {other:?}"))),
            };
            self.expect(Token::Colon)?;
            let value = self.expr()?;
            entries.push((key, value));
            match self.advance() {
                Token::Comma => {}
                Token::RBrace => return Ok(Value::Dict(entries)),
                other => return Err(error(format!("expected , or }}, found {other:?}"))),
            }
        }
    }

    /// A parenthesised expression, or a tuple (kept as a list) when it has a comma.
    fn paren(&mut self) -> ChangeResult<Value> {
        if *self.peek() == Token::RParen {
            self.advance();
            return Ok(Value::List(Vec::new()));
        }
        let first = self.expr()?;
        if *self.peek() != Token::Comma {
            self.expect(Token::RParen)?;
            return Ok(first);
        }

        let mut items = vec![first];
        loop {
            match self.advance() {
                Token::Comma => {}
                Token::RParen => return Ok(Value::List(items)),
                other => return Err(error(format!("expected , or ), found {other:?}"))),
            }
            if *self.peek() == Token::RParen {
                self.advance();
                return Ok(Value::List(items));
            }
            items.push(self.expr()?);
        }
    }

    fn list(&mut self) -> ChangeResult<Value> {
        let mut items = Vec::new();
        loop {
            if *self.peek() == Token::RBracket {
                self.advance();
                return Ok(Value::List(items));
            }
            items.push(self.expr()?);
            match self.advance() {
                Token::Comma => {}
                Token::RBracket => return Ok(Value::List(items)),
                other => return Err(error(format!("expected , or ], found {other:?}"))),
            }
        }
    }
}

/// Substitute `{name}` references to string vars.
fn interpolate(s: &str, vars: &BTreeMap<String, Value>) -> String {
    let mut out = s.to_string();
    for (name, value) in vars {
        if let Value::Str(replacement) = value {
            out = out.replace(&format!("{{{name}}}"), replacement);
        }
    }
    out
}

fn entry(path: &str, value: &Value, vars: &BTreeMap<String, Value>) -> Option<DepsEntry> {
    let pin = match value {
        Value::Str(s) => s,
        Value::Dict(_) => match value.get("url") {
            Some(Value::Str(s)) => s,
            _ => return None,
        },
        _ => return None,
    };
    let pin = interpolate(pin, vars);
    let (url, revision) = pin.rsplit_once('@')?;
    if url.is_empty() || revision.is_empty() {
        return None;
    }
    Some(DepsEntry {
        path: path.to_string(),
        url: url.to_string(),
        revision: revision.to_string(),
    })
}

/// Extract every pinned dependency from `deps` and all `deps_os` sections.
/// Unpinned entries (no `@revision`) and `None` values are skipped.
pub fn parse(contents: &str) -> ChangeResult<Vec<DepsEntry>> {
    let mut parser = Parser {
        tokens: tokenize(contents)?,
        pos: 0,
        vars: BTreeMap::new(),
    };
    let globals = parser.assignments()?;
    let vars = parser.vars;

    let mut entries = Vec::new();
    if let Some(Value::Dict(deps)) = globals.get("deps") {
        entries.extend(deps.iter().filter_map(|(path, v)| entry(path, v, &vars)));
    }
    if let Some(Value::Dict(deps_os)) = globals.get("deps_os") {
        for (_, os_deps) in deps_os {
            if let Value::Dict(os_deps) = os_deps {
                entries.extend(os_deps.iter().filter_map(|(path, v)| entry(path, v, &vars)));
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_concatenation_and_deps_os() {
        let contents = r#"
vars = {
  'chromium_git': 'https://chromium.googlesource.com',
}
deps = {
  'src/v8': Var('chromium_git') + '/v8/v8.git' + '@' + 'c092edb',
}
deps_os = {
  'win': {
    'src/third_party/cygwin':
      Var('chromium_git') + '/chromium/deps/cygwin.git' + '@' + 'c89e446',
  }
}
"#;
        let entries = parse(contents).unwrap();
        assert_eq!(
            entries,
            vec![
                DepsEntry {
                    path: "src/v8".to_string(),
                    url: "https://chromium.googlesource.com/v8/v8.git".to_string(),
                    revision: "c092edb".to_string(),
                },
                DepsEntry {
                    path: "src/third_party/cygwin".to_string(),
                    url: "https://chromium.googlesource.com/chromium/deps/cygwin.git"
                        .to_string(),
                    revision: "c89e446".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_empty_deps() {
        assert!(parse("deps = {}").unwrap().is_empty());
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_dict_values_and_interpolation() {
        let contents = r#"
# Comment lines are ignored.
use_relative_paths = True
vars = {"git": "https://host.example", "rev": "abc1234", "checkout_x": False}
deps = {
  "src/a": {"url": "{git}/a.git@" + Var("rev"), "condition": "checkout_x"},
  "src/b": {"packages": [{"package": "cipd/pkg", "version": "v1"}], "dep_type": "cipd"},
  "src/c": None,
  "src/d": "https://host.example/d.git",
}
hooks = [{"name": "lastchange", "action": ["python", "build/util/lastchange.py"]}]
"#;
        let entries = parse(contents).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://host.example/a.git");
        assert_eq!(entries[0].revision, "abc1234");
    }

    #[test]
    fn test_parse_tuples_in_recursedeps_and_hooks() {
        let contents = r#"
gclient_gn_args_file = 'src/build/config/gclient_args.gni'
vars = {
  'chromium_git': 'https://chromium.googlesource.com',
  'catapult_revision': 'e0a2efbb3d1a81aac3c90041eefec24f066d26ba',
}
deps = {
  'src/third_party/catapult':
    Var('chromium_git') + '/catapult.git' + '@' + Var('catapult_revision'),
  'src/third_party/android_tools': {
    'url': Var('chromium_git') + '/android_tools.git' + '@' + 'c22a664',
    'condition': 'checkout_android',
  },
}
hooks = [
  {
    'name': 'sysroot',
    'pattern': '.',
    'action': ['python', 'src/build/linux/sysroot_scripts/install-sysroot.py',
               '--arch=x86'],
  },
]
recursedeps = [
  'src/third_party/catapult',
  ('src/third_party/android_tools', 'DEPS'),
]
skip_child_includes = ('breakpad', 'native_client_sdk',)
empty = ()
grouped = ('a' + 'b')
"#;
        let entries = parse(contents).unwrap();
        let pins: Vec<(&str, &str)> = entries
            .iter()
            .map(|e| (e.path.as_str(), e.revision.as_str()))
            .collect();
        assert_eq!(
            pins,
            vec![
                (
                    "src/third_party/catapult",
                    "e0a2efbb3d1a81aac3c90041eefec24f066d26ba"
                ),
                ("src/third_party/android_tools", "c22a664"),
            ]
        );
    }

    #[test]
    fn test_parse_tuple_values() {
        let mut parser = Parser {
            tokens: tokenize("x = ('a', ('b', 1),)\ny = ('c')").unwrap(),
            pos: 0,
            vars: BTreeMap::new(),
        };
        let globals = parser.assignments().unwrap();
        assert_eq!(
            globals["x"],
            Value::List(vec![
                Value::Str("a".to_string()),
                Value::List(vec![Value::Str("b".to_string()), Value::Int(1)]),
            ])
        );
        assert_eq!(globals["y"], Value::Str("c".to_string()));
        assert!(parse("x = ('a' 'b'").is_err());
    }

    #[test]
    fn test_parse_rejects_undefined_var() {
        let err = parse("deps = {'src/a': Var('missing') + '@abc'}").unwrap_err();
        assert!(matches!(err, ChangeError::DepsFile(_)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("deps = {'a': ").is_err());
        assert!(parse("deps = 'unterminated").is_err());
        assert!(parse("import os").is_err());
    }
}
