/*  Expression and statement AST for the configuration DSL, spec.md §4.3.
 *  Expressions carry no static type; they're evaluated against one of
 *  five typed contexts (`EvalContext`) at runtime, and a mismatched
 *  context yields that context's empty value rather than an error
 *  (`crate::error::EvalError` exists only for diagnostics, never as a
 *  hard failure path) — confirmed against `original_source/parse.c`.
 */
use crate::dhcp::dhcppkt::DhcpOption;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalContext {
    Boolean,
    Data,
    Numeric,
    Dns,
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    ConstData(Vec<u8>),
    ConstString(String),
    ConstNumber(i64),
    ConstIp(std::net::Ipv4Addr),
    Option(DhcpOption),
    ExistsOption(DhcpOption),
    Known,
    PacketField(String),

    Substring { base: Box<Expr>, offset: Box<Expr>, len: Box<Expr> },
    Suffix { base: Box<Expr>, len: Box<Expr> },
    Concat(Vec<Expr>),
    /// `pick-first-value(a, b, c)`: first operand that evaluates to a
    /// defined, non-empty value in the enclosing context wins.
    PickFirstValue(Vec<Expr>),
    BinaryToAscii { base: Box<Expr>, width: u8, separator: String },
    ExtractInt { base: Box<Expr>, width: u8 },
    EncodeInt { base: Box<Expr>, width: u8 },

    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Equal(Box<Expr>, Box<Expr>),
    NotEqual(Box<Expr>, Box<Expr>),
}

/// A statement in the executable sense (spec.md §4.3): either a
/// declaration-time assignment, an `if`/`elsif`/`else` branch whose arms
/// are themselves statement lists, or one of the control/binding forms
/// below. `switch`'s `case` arms don't fall through into one another
/// (`original_source/parse.c`'s `parse_case_statement` treats each arm
/// independently) — the first matching `case`, or `default` if none
/// matches, is the only body that runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Default { option: DhcpOption, value: Expr },
    Supersede { option: DhcpOption, value: Expr },
    Append { option: DhcpOption, value: Expr },
    Prepend { option: DhcpOption, value: Expr },
    Unset(DhcpOption),
    If { branches: Vec<(Expr, Vec<Stmt>)>, otherwise: Vec<Stmt> },
    Switch { subject: Expr, cases: Vec<(SwitchCase, Vec<Stmt>)> },
    Break,
    Log { priority: LogPriority, message: Expr },
    /// `set <var> = <expr>;` — writes into the lease's binding scope
    /// (spec.md §4.3/§4.6), not into the reply being built.
    Set { var: String, value: Expr },
    /// `on commit|expiry|release [or ...] { ... }` — fired from
    /// `lease.rs`'s state transitions via `eval::fire_hooks` rather than
    /// from `apply_statements`'s reply-building walk.
    On { events: Vec<HookEvent>, body: Vec<Stmt> },
    /// `add <class>;` — assigns the matched request to a dynamically
    /// spawned subclass of `<class>`.
    AddClass(String),
    Eval(Expr),
    /// `statements { ... }` — a bare nested block, no new scoping rules.
    Statements(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwitchCase {
    Case(Expr),
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogPriority {
    Info,
    Fatal,
}

/// Lease-lifecycle events an `on` hook can trigger on, spec.md §4.5/§4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Commit,
    Expiry,
    Release,
}
