/*  Token kinds for the configuration DSL (spec.md §4.1/§4.2). One token of
 *  lookahead is all the grammar needs; everything heavier (macros,
 *  line continuation) lives in `Lexer`, not here.
 */
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    Number(i64),
    HexNumber(Vec<u8>),
    Text(String),
    Ip(std::net::Ipv4Addr),

    LBrace,
    RBrace,
    LParen,
    RParen,
    Semicolon,
    Comma,
    Slash,
    Equals,
    Plus,
    Minus,
    Star,
    Amp,
    Pipe,
    Caret,
    Bang,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Colon,
    Dot,

    // Keywords. The original C lexer uses a string-interning table that
    // maps `unauthenticated` onto the same token as `authenticated` — a
    // plain cut/paste bug. Here they're deliberately distinct tokens, so
    // nothing downstream confuses one for the other.
    Host,
    Subnet,
    Range,
    Hardware,
    Ethernet,
    TokenRing,
    Fddi,
    Option,
    Default,
    Supersede,
    Append,
    Prepend,
    Allow,
    Deny,
    Ignore,
    UnknownClients,
    SharedNetwork,
    Pool,
    Group,
    Class,
    Subclass,
    FixedAddress,
    MaxLeaseTime,
    DefaultLeaseTime,
    MinLeaseTime,
    If,
    Elsif,
    Else,
    Exists,
    Known,
    Not,
    And,
    Or,
    Authenticated,
    Unauthenticated,
    Code,
    Space,
    Array,
    Of,
    Log,
    Config,
    On,
    Set,
    Unset,
    Eval,
    Statements,
    Commit,
    Expiry,
    Release,
    Match,
    Spawn,
    With,
    Lease,
    Limit,
    Switch,
    Case,
    Break,
    Add,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(s) => write!(f, "{}", s),
            Token::Number(n) => write!(f, "{}", n),
            Token::Text(s) => write!(f, "{:?}", s),
            Token::Ip(a) => write!(f, "{}", a),
            Token::HexNumber(b) => {
                write!(f, "{}", b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(":"))
            }
            Token::Eof => write!(f, "<eof>"),
            other => write!(f, "{:?}", other),
        }
    }
}

pub fn keyword(name: &str) -> Option<Token> {
    Some(match name {
        "host" => Token::Host,
        "subnet" => Token::Subnet,
        "range" => Token::Range,
        "hardware" => Token::Hardware,
        "ethernet" => Token::Ethernet,
        "token-ring" => Token::TokenRing,
        "fddi" => Token::Fddi,
        "option" => Token::Option,
        "default" => Token::Default,
        "supersede" => Token::Supersede,
        "append" => Token::Append,
        "prepend" => Token::Prepend,
        "allow" => Token::Allow,
        "deny" => Token::Deny,
        "ignore" => Token::Ignore,
        "known" => Token::Known,
        "unknown-clients" => Token::UnknownClients,
        "shared-network" => Token::SharedNetwork,
        "pool" => Token::Pool,
        "group" => Token::Group,
        "class" => Token::Class,
        "subclass" => Token::Subclass,
        "fixed-address" => Token::FixedAddress,
        "max-lease-time" => Token::MaxLeaseTime,
        "default-lease-time" => Token::DefaultLeaseTime,
        "min-lease-time" => Token::MinLeaseTime,
        "if" => Token::If,
        "elsif" => Token::Elsif,
        "else" => Token::Else,
        "exists" => Token::Exists,
        "not" => Token::Not,
        "and" => Token::And,
        "or" => Token::Or,
        "authenticated" => Token::Authenticated,
        "unauthenticated" => Token::Unauthenticated,
        "code" => Token::Code,
        "space" => Token::Space,
        "array" => Token::Array,
        "of" => Token::Of,
        "log" => Token::Log,
        "configuration" => Token::Config,
        "on" => Token::On,
        "set" => Token::Set,
        "unset" => Token::Unset,
        "eval" => Token::Eval,
        "statements" => Token::Statements,
        "commit" => Token::Commit,
        "expiry" => Token::Expiry,
        "release" => Token::Release,
        "match" => Token::Match,
        "spawn" => Token::Spawn,
        "with" => Token::With,
        "lease" => Token::Lease,
        "limit" => Token::Limit,
        "switch" => Token::Switch,
        "case" => Token::Case,
        "break" => Token::Break,
        "add" => Token::Add,
        _ => return None,
    })
}
