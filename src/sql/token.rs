//! Tokens: the smallest pieces of emitted SQL.
//!
//! Everything the compiler writes goes through a [`Token`], so identifier
//! quoting, literal spelling and function renames are decided in exactly
//! one place per dialect.

use super::dialect::{Dialect, SqlDialect};

/// One unit of SQL output.
///
/// Adding a variant forces every serialization site to handle it.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Select,
    Distinct,
    From,
    Where,
    GroupBy,
    OrderBy,
    Asc,
    Desc,
    Limit,
    Offset,
    Fetch,
    Next,
    Rows,
    Only,
    Join,
    Inner,
    Left,
    Right,
    Full,
    Outer,
    Cross,
    On,
    As,
    With,
    Union,
    All,
    And,
    Or,
    Not,
    In,
    IsNull,
    IsNotNull,
    Case,
    When,
    Then,
    Else,
    End,
    Cast,
    Null,

    // Punctuation and operators
    Comma,
    Dot,
    Star,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Concat,

    // Layout
    Space,
    Newline,
    Indent(usize),

    /// Table, column, alias or CTE name; quoted per dialect.
    Ident(String),
    LitInt(i64),
    /// Always finite: literal construction rejects NaN and infinities.
    LitFloat(f64),
    LitString(String),
    LitBool(bool),
    LitNull,
    LitBytes(Vec<u8>),
    /// Function name, renamed by [`SqlDialect::remap_function`] and
    /// uppercased.
    FunctionName(String),
    /// Type name inside `CAST(.. AS <type>)`, already spelled for the dialect.
    TypeName(String),
    /// Static text from dialect rule templates. Never user data: values are
    /// always carried by the `Lit*` variants.
    Raw(String),
}

impl Token {
    fn keyword(&self) -> Option<&'static str> {
        Some(match self {
            Token::Select => "SELECT",
            Token::Distinct => "DISTINCT",
            Token::From => "FROM",
            Token::Where => "WHERE",
            Token::GroupBy => "GROUP BY",
            Token::OrderBy => "ORDER BY",
            Token::Asc => "ASC",
            Token::Desc => "DESC",
            Token::Limit => "LIMIT",
            Token::Offset => "OFFSET",
            Token::Fetch => "FETCH",
            Token::Next => "NEXT",
            Token::Rows => "ROWS",
            Token::Only => "ONLY",
            Token::Join => "JOIN",
            Token::Inner => "INNER",
            Token::Left => "LEFT",
            Token::Right => "RIGHT",
            Token::Full => "FULL",
            Token::Outer => "OUTER",
            Token::Cross => "CROSS",
            Token::On => "ON",
            Token::As => "AS",
            Token::With => "WITH",
            Token::Union => "UNION",
            Token::All => "ALL",
            Token::And => "AND",
            Token::Or => "OR",
            Token::Not => "NOT",
            Token::In => "IN",
            Token::IsNull => "IS NULL",
            Token::IsNotNull => "IS NOT NULL",
            Token::Case => "CASE",
            Token::When => "WHEN",
            Token::Then => "THEN",
            Token::Else => "ELSE",
            Token::End => "END",
            Token::Cast => "CAST",
            Token::Null => "NULL",
            _ => return None,
        })
    }

    fn symbol(&self) -> Option<&'static str> {
        Some(match self {
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Star | Token::Mul => "*",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Eq => "=",
            Token::Ne => "<>",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Lte => "<=",
            Token::Gte => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Div => "/",
            Token::Mod => "%",
            Token::Space => " ",
            Token::Newline => "\n",
            _ => return None,
        })
    }

    /// Render this token for `dialect`.
    pub fn serialize(&self, dialect: Dialect) -> String {
        if let Some(text) = self.keyword().or_else(|| self.symbol()) {
            return text.to_string();
        }
        match self {
            Token::Concat => dialect.concat_operator().to_string(),
            Token::Indent(depth) => "  ".repeat(*depth),
            Token::Ident(name) => dialect.quote_identifier(name),
            Token::LitInt(n) => n.to_string(),
            Token::LitFloat(f) => {
                assert!(f.is_finite(), "non-finite float literal {f} reached SQL output");
                ryu::Buffer::new().format_finite(*f).to_string()
            }
            Token::LitString(s) => dialect.quote_string(s),
            Token::LitBool(b) => dialect.format_bool(*b).to_string(),
            Token::LitNull => dialect.format_null().to_string(),
            Token::LitBytes(bytes) => dialect.format_bytes(bytes),
            Token::FunctionName(name) => dialect
                .remap_function(name)
                .unwrap_or(name.as_str())
                .to_uppercase(),
            Token::TypeName(text) | Token::Raw(text) => text.clone(),
            other => unreachable!("{other:?} is a keyword or symbol"),
        }
    }
}

/// Tokens accumulated for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend_from_slice(&other.tokens);
        self
    }

    pub fn serialize(&self, dialect: Dialect) -> String {
        self.tokens.iter().map(|t| t.serialize(dialect)).collect()
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }

    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }

    pub fn indent(&mut self, depth: usize) -> &mut Self {
        self.push(Token::Indent(depth))
    }

    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }

    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }

    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}
