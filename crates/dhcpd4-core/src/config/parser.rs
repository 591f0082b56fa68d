/*  Recursive-descent parser for the configuration DSL, spec.md §4.2.
 *  Declarations (`host`, `subnet`, `shared-network`, `pool`, `group`,
 *  `class`) may nest; each opens a brace block that is itself a sequence
 *  of statements. A malformed statement doesn't abort the whole file: on
 *  error the parser resynchronizes to the next `;` at the current nesting
 *  depth, or to the closing `}` of the innermost block, matching
 *  `confpars.c`'s recovery strategy (spec.md §4.2's testable property on
 *  resync, and the `skip_to_semi`/`skip_to_rbrace` split named there).
 *
 *  Subnets are written in CIDR form (`subnet 10.0.0.0/24 { ... }`) rather
 *  than the `subnet <addr> netmask <mask>` form of the original —
 *  equivalent information, fewer tokens, and consistent with
 *  `Ipv4Subnet`'s own `addr/prefixlen` notation used everywhere else in
 *  this crate.
 */
use super::ast::{Expr, HookEvent, LogPriority, Stmt, SwitchCase};
use super::lexer::{LexError, Lexer, Pos, Spanned};
use super::model::*;
use super::token::Token;
use crate::dhcp::dhcppkt::{self, DhcpOption};
use dhcpd4_net::{HwAddr, HWTYPE_ETHERNET, HWTYPE_FDDI, HWTYPE_TOKEN_RING};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    pub pos: Pos,
    pub message: String,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    pub warnings: Vec<ParseWarning>,
}

type PResult<T> = Result<T, ParseWarning>;

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Self {
        Parser { lexer: Lexer::new(src), warnings: vec![] }
    }

    fn warn(&mut self, pos: Pos, message: impl Into<String>) {
        self.warnings.push(ParseWarning { pos, message: message.into() });
    }

    fn next(&mut self) -> PResult<Spanned> {
        self.lexer.next().map_err(|e| self.lex_err(e))
    }

    fn peek(&mut self) -> PResult<Spanned> {
        self.lexer.peek().map_err(|e| self.lex_err(e))
    }

    fn lex_err(&self, e: LexError) -> ParseWarning {
        let pos = match e {
            LexError::UnterminatedString(p) | LexError::InvalidEscape(p) | LexError::BadNumber(p) => p,
        };
        ParseWarning { pos, message: format!("{:?}", e) }
    }

    fn expect(&mut self, want: Token) -> PResult<()> {
        let got = self.next()?;
        if got.token == want {
            Ok(())
        } else {
            Err(ParseWarning { pos: got.pos, message: format!("expected {:?}, found {:?}", want, got.token) })
        }
    }

    fn expect_name(&mut self) -> PResult<String> {
        let got = self.next()?;
        match got.token {
            Token::Name(n) => Ok(n),
            other => Err(ParseWarning { pos: got.pos, message: format!("expected a name, found {:?}", other) }),
        }
    }

    /// Resynchronizes after a malformed statement: discard tokens up to
    /// and including the next `;`, or stop (without consuming) at a `}`
    /// that closes the current block.
    fn skip_to_semi(&mut self) {
        loop {
            match self.next() {
                Ok(Spanned { token: Token::Semicolon, .. }) | Ok(Spanned { token: Token::Eof, .. }) => return,
                Ok(Spanned { token: Token::RBrace, .. }) => return,
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
    }

    fn skip_to_rbrace(&mut self) {
        let mut depth = 0;
        loop {
            match self.next() {
                Ok(Spanned { token: Token::LBrace, .. }) => depth += 1,
                Ok(Spanned { token: Token::RBrace, .. }) => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                Ok(Spanned { token: Token::Eof, .. }) => return,
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
    }

    pub fn parse(mut self) -> (Model, Vec<ParseWarning>) {
        let mut model = Model::new();
        loop {
            match self.peek() {
                Ok(Spanned { token: Token::Eof, .. }) => break,
                Ok(_) => {
                    if let Err(w) = self.parse_top_statement(&mut model) {
                        self.warn(w.pos, w.message);
                        self.skip_to_semi();
                    }
                }
                Err(w) => {
                    self.warn(w.pos, w.message);
                    self.skip_to_semi();
                }
            }
        }
        (model, self.warnings)
    }

    fn parse_top_statement(&mut self, model: &mut Model) -> PResult<()> {
        let tok = self.peek()?;
        match tok.token {
            Token::Host => {
                self.next()?;
                let host = self.parse_host(model)?;
                model.add_host(host);
                Ok(())
            }
            Token::Subnet => {
                self.next()?;
                self.parse_subnet_into(model)?;
                Ok(())
            }
            Token::SharedNetwork => {
                self.next()?;
                self.parse_shared_network(model)
            }
            Token::Group => {
                self.next()?;
                self.parse_group(model)
            }
            Token::Class | Token::Subclass => {
                self.next()?;
                let class = self.parse_class(model)?;
                model.add_class(class);
                Ok(())
            }
            Token::Code => {
                self.next()?;
                self.parse_option_definition(model)
            }
            _ => {
                let stmt = self.parse_scope_statement(model)?;
                model.top.statements.push(stmt);
                Ok(())
            }
        }
    }

    /// `option NAME code N = TYPE;` — registers a custom option name in
    /// the model's dynamic registry, layered over the static DHCP table.
    fn parse_option_definition(&mut self, model: &mut Model) -> PResult<()> {
        let name = self.expect_name()?;
        self.expect(Token::Code)?;
        let code_tok = self.next()?;
        let code = match code_tok.token {
            Token::Number(n) if (0..=255).contains(&n) => n as u8,
            other => {
                return Err(ParseWarning {
                    pos: code_tok.pos,
                    message: format!("expected an option code 0-255, found {:?}", other),
                })
            }
        };
        self.expect(Token::Equals)?;
        // Type tag (`string`, `ip-address`, `unsigned integer 16`, `array of ...`)
        // is consumed but not separately modeled — the dynamic option's
        // wire representation is opaque bytes, same as `DhcpOptionType::Unknown`.
        self.skip_to_semi();
        model.option_defs.push((name, DhcpOption::new(code)));
        Ok(())
    }

    fn parse_host(&mut self, model: &mut Model) -> PResult<Host> {
        let name = self.expect_name()?;
        self.expect(Token::LBrace)?;
        let mut host = Host {
            name,
            hardware: None,
            client_id: None,
            fixed_address: None,
            scope: Scope::default(),
        };
        loop {
            let tok = self.peek()?;
            match tok.token {
                Token::RBrace => {
                    self.next()?;
                    break;
                }
                Token::Eof => break,
                Token::Hardware => {
                    self.next()?;
                    host.hardware = Some(self.parse_hardware()?);
                }
                Token::FixedAddress => {
                    self.next()?;
                    host.fixed_address = Some(self.parse_ip()?);
                    self.expect(Token::Semicolon)?;
                }
                _ => match self.parse_scope_statement(model) {
                    Ok(s) => host.scope.statements.push(s),
                    Err(w) => {
                        self.warn(w.pos, w.message);
                        self.skip_to_semi();
                    }
                },
            }
        }
        Ok(host)
    }

    fn parse_hardware(&mut self) -> PResult<HwAddr> {
        let kind = self.next()?;
        let htype = match kind.token {
            Token::Ethernet => HWTYPE_ETHERNET,
            Token::TokenRing => HWTYPE_TOKEN_RING,
            Token::Fddi => HWTYPE_FDDI,
            other => {
                return Err(ParseWarning { pos: kind.pos, message: format!("unknown hardware type {:?}", other) })
            }
        };
        let addr_tok = self.next()?;
        let addr = match addr_tok.token {
            Token::HexNumber(b) => b,
            other => {
                return Err(ParseWarning {
                    pos: addr_tok.pos,
                    message: format!("expected a colon-hex hardware address, found {:?}", other),
                })
            }
        };
        self.expect(Token::Semicolon)?;
        Ok(HwAddr::new(htype, addr))
    }

    fn parse_ip(&mut self) -> PResult<Ipv4Addr> {
        let tok = self.next()?;
        match tok.token {
            Token::Ip(a) => Ok(a),
            other => Err(ParseWarning { pos: tok.pos, message: format!("expected an IP address, found {:?}", other) }),
        }
    }

    fn parse_subnet_into(&mut self, model: &mut Model) -> PResult<SubnetHandle> {
        let addr = self.parse_ip()?;
        self.expect(Token::Slash)?;
        let len_tok = self.next()?;
        let prefixlen = match len_tok.token {
            Token::Number(n) if (0..=32).contains(&n) => n as u8,
            other => {
                return Err(ParseWarning { pos: len_tok.pos, message: format!("expected a prefix length, found {:?}", other) })
            }
        };
        let net = dhcpd4_net::Ipv4Subnet::new(addr, prefixlen)
            .map_err(|e| ParseWarning { pos: len_tok.pos, message: e.to_string() })?;
        self.expect(Token::LBrace)?;
        let handle = model.add_subnet(Subnet { net, shared_network: None, pools: vec![], scope: Scope::default() });
        loop {
            let tok = self.peek()?;
            match tok.token {
                Token::RBrace => {
                    self.next()?;
                    break;
                }
                Token::Eof => break,
                Token::Pool => {
                    self.next()?;
                    let (ranges, rules, scope) = self.parse_pool_body(model)?;
                    model.add_pool(Pool { subnet: handle, ranges, rules, scope });
                }
                _ => match self.parse_scope_statement(model) {
                    Ok(s) => model.subnets[handle.0].scope.statements.push(s),
                    Err(w) => {
                        self.warn(w.pos, w.message);
                        self.skip_to_semi();
                    }
                },
            }
        }
        Ok(handle)
    }

    /// Parses `pool { range a b; allow ...; }`, returning the statements
    /// and range list; the caller owns linking it into the model since a
    /// `Pool` needs its enclosing `SubnetHandle`, assigned by `add_pool`.
    fn parse_pool_body(&mut self, model: &mut Model) -> PResult<(Vec<(Ipv4Addr, Ipv4Addr)>, Vec<PoolRule>, Scope)> {
        self.expect(Token::LBrace)?;
        let mut ranges = vec![];
        let mut rules = vec![];
        let mut scope = Scope::default();
        loop {
            let tok = self.peek()?;
            match tok.token {
                Token::RBrace => {
                    self.next()?;
                    break;
                }
                Token::Eof => break,
                Token::Range => {
                    self.next()?;
                    let lo = self.parse_ip()?;
                    let hi = self.parse_ip()?;
                    self.expect(Token::Semicolon)?;
                    ranges.push((lo, hi));
                }
                Token::Allow | Token::Deny | Token::Ignore => {
                    let rule = self.parse_pool_rule(model)?;
                    rules.push(rule);
                }
                _ => match self.parse_scope_statement(model) {
                    Ok(s) => scope.statements.push(s),
                    Err(w) => {
                        self.warn(w.pos, w.message);
                        self.skip_to_semi();
                    }
                },
            }
        }
        Ok((ranges, rules, scope))
    }

    fn parse_pool_rule(&mut self, model: &mut Model) -> PResult<PoolRule> {
        let verb = self.next()?;
        let subject = self.next()?;
        let rule = match (&verb.token, &subject.token) {
            (Token::Allow, Token::Known) => PoolRule::AllowKnownClients,
            (Token::Deny, Token::Known) => PoolRule::DenyKnownClients,
            (Token::Allow, Token::UnknownClients) => PoolRule::AllowUnknownClients,
            (Token::Deny, Token::UnknownClients) => PoolRule::DenyUnknownClients,
            (Token::Allow, Token::Name(_)) | (Token::Deny, Token::Name(_)) | (Token::Ignore, Token::Name(_)) => {
                let name = match &subject.token {
                    Token::Name(n) => n.clone(),
                    _ => unreachable!(),
                };
                let handle = model.class_by_name(&name).unwrap_or_else(|| {
                    model.add_class(Class { name: name.clone(), matches: None, spawn_with: None, lease_limit: None, scope: Scope::default() })
                });
                match verb.token {
                    Token::Allow => PoolRule::AllowClass(handle),
                    Token::Deny => PoolRule::DenyClass(handle),
                    Token::Ignore => PoolRule::IgnoreClass(handle),
                    _ => unreachable!(),
                }
            }
            _ => {
                return Err(ParseWarning {
                    pos: subject.pos,
                    message: format!("unrecognized pool rule {:?} {:?}", verb.token, subject.token),
                })
            }
        };
        self.expect(Token::Semicolon)?;
        Ok(rule)
    }

    fn parse_shared_network(&mut self, model: &mut Model) -> PResult<()> {
        let name = self.expect_name()?;
        self.expect(Token::LBrace)?;
        let sn_handle = model.add_shared_network(SharedNetwork { name, subnets: vec![], scope: Scope::default() });
        loop {
            let tok = self.peek()?;
            match tok.token {
                Token::RBrace => {
                    self.next()?;
                    break;
                }
                Token::Eof => break,
                Token::Subnet => {
                    self.next()?;
                    let h = self.parse_subnet_into(model)?;
                    model.subnets[h.0].shared_network = Some(sn_handle);
                    model.shared_networks[sn_handle.0].subnets.push(h);
                }
                _ => match self.parse_scope_statement(model) {
                    Ok(s) => model.shared_networks[sn_handle.0].scope.statements.push(s),
                    Err(w) => {
                        self.warn(w.pos, w.message);
                        self.skip_to_semi();
                    }
                },
            }
        }
        Ok(())
    }

    fn parse_group(&mut self, model: &mut Model) -> PResult<()> {
        self.expect(Token::LBrace)?;
        let mut group = Group { name: None, scope: Scope::default() };
        loop {
            let tok = self.peek()?;
            match tok.token {
                Token::RBrace => {
                    self.next()?;
                    break;
                }
                Token::Eof => break,
                Token::Host => {
                    self.next()?;
                    let host = self.parse_host(model)?;
                    model.add_host(host);
                }
                _ => match self.parse_scope_statement(model) {
                    Ok(s) => group.scope.statements.push(s),
                    Err(w) => {
                        self.warn(w.pos, w.message);
                        self.skip_to_semi();
                    }
                },
            }
        }
        model.add_group(group);
        Ok(())
    }

    fn parse_class(&mut self, model: &mut Model) -> PResult<Class> {
        let name_tok = self.next()?;
        let name = match name_tok.token {
            Token::Text(s) | Token::Name(s) => s,
            other => {
                return Err(ParseWarning { pos: name_tok.pos, message: format!("expected a class name, found {:?}", other) })
            }
        };
        self.expect(Token::LBrace)?;
        let mut class = Class { name, matches: None, spawn_with: None, lease_limit: None, scope: Scope::default() };
        loop {
            let tok = self.peek()?;
            match tok.token {
                Token::RBrace => {
                    self.next()?;
                    break;
                }
                Token::Eof => break,
                Token::Match => {
                    self.next()?;
                    let expr = if self.peek()?.token == Token::If {
                        self.next()?;
                        self.parse_bool_expr()?
                    } else {
                        self.parse_expr()?
                    };
                    self.expect(Token::Semicolon)?;
                    class.matches = Some(expr);
                }
                Token::Spawn => {
                    self.next()?;
                    self.expect(Token::With)?;
                    let expr = self.parse_expr()?;
                    self.expect(Token::Semicolon)?;
                    class.spawn_with = Some(expr);
                }
                Token::Lease => {
                    self.next()?;
                    self.expect(Token::Limit)?;
                    let n = self.next()?;
                    let limit = match n.token {
                        Token::Number(v) if v >= 0 => v as u32,
                        other => {
                            return Err(ParseWarning { pos: n.pos, message: format!("expected a lease limit, found {:?}", other) })
                        }
                    };
                    self.expect(Token::Semicolon)?;
                    class.lease_limit = Some(limit);
                }
                _ => match self.parse_scope_statement(model) {
                    Ok(s) => class.scope.statements.push(s),
                    Err(w) => {
                        self.warn(w.pos, w.message);
                        self.skip_to_semi();
                    }
                },
            }
        }
        Ok(class)
    }

    /// Statements legal in any scope: option merge verbs, lease-time
    /// parameters, `if`/`elsif`/`else`, `switch`/`case`, `log`, and the
    /// binding-scope/hook forms (`set`, `on`, `add`, `unset`, `eval`).
    fn parse_scope_statement(&mut self, model: &mut Model) -> PResult<Stmt> {
        let tok = self.next()?;
        match tok.token {
            Token::Default => self.parse_option_verb(|option, value| Stmt::Default { option, value }),
            Token::Supersede => self.parse_option_verb(|option, value| Stmt::Supersede { option, value }),
            Token::Append => self.parse_option_verb(|option, value| Stmt::Append { option, value }),
            Token::Prepend => self.parse_option_verb(|option, value| Stmt::Prepend { option, value }),
            // Bare `option NAME = EXPR;` is sugar for `supersede option ...`.
            Token::Option => {
                let (option, value) = self.parse_option_name_value()?;
                Ok(Stmt::Supersede { option, value })
            }
            Token::Unset => {
                self.expect(Token::Option)?;
                let name = self.expect_name()?;
                let option = dhcppkt::name_to_option(&name).unwrap_or_else(|| DhcpOption::new(0));
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Unset(option))
            }
            Token::If => self.parse_if(model),
            Token::Switch => self.parse_switch(model),
            Token::Break => {
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Break)
            }
            Token::Add => {
                let name = self.expect_name()?;
                self.expect(Token::Semicolon)?;
                Ok(Stmt::AddClass(name))
            }
            Token::Set => {
                let var = self.expect_name()?;
                self.expect(Token::Equals)?;
                let value = self.parse_expr()?;
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Set { var, value })
            }
            Token::On => self.parse_on(model),
            Token::Eval => {
                let expr = self.parse_expr()?;
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Eval(expr))
            }
            Token::Statements => {
                self.expect(Token::LBrace)?;
                Ok(Stmt::Statements(self.parse_stmt_list(model)?))
            }
            Token::Log => self.parse_log(),
            Token::MaxLeaseTime | Token::DefaultLeaseTime | Token::MinLeaseTime => {
                // Folded into the enclosing `Scope`'s dedicated fields by
                // the caller via `apply_scope_shortcut`; represented here
                // as a no-op `Default`-style marker so it still round-trips
                // through the statement list for diagnostics.
                let n = self.next()?;
                self.expect(Token::Semicolon)?;
                let value = match n.token {
                    Token::Number(v) => Expr::ConstNumber(v),
                    other => return Err(ParseWarning { pos: n.pos, message: format!("expected a number, found {:?}", other) }),
                };
                Ok(Stmt::Default { option: dhcppkt::OPTION_LEASETIME, value })
            }
            other => Err(ParseWarning { pos: tok.pos, message: format!("unexpected token {:?}", other) }),
        }
    }

    fn parse_option_verb(&mut self, make: impl FnOnce(DhcpOption, Expr) -> Stmt) -> PResult<Stmt> {
        self.expect(Token::Option)?;
        let (option, value) = self.parse_option_name_value()?;
        Ok(make(option, value))
    }

    /// Parses `NAME = EXPR;` once the leading `option` keyword (verb or
    /// bare) has already been consumed.
    fn parse_option_name_value(&mut self) -> PResult<(DhcpOption, Expr)> {
        let name_tok = self.next()?;
        let name = match name_tok.token {
            Token::Name(n) => n,
            other => return Err(ParseWarning { pos: name_tok.pos, message: format!("expected an option name, found {:?}", other) }),
        };
        let option = dhcppkt::name_to_option(&name).unwrap_or_else(|| DhcpOption::new(0));
        self.expect(Token::Equals)?;
        let value = self.parse_expr()?;
        self.expect(Token::Semicolon)?;
        Ok((option, value))
    }

    /// `switch (<expr>) { case <expr>: <stmt>*; default: <stmt>*; }`
    fn parse_switch(&mut self, model: &mut Model) -> PResult<Stmt> {
        self.expect(Token::LParen)?;
        let subject = self.parse_expr()?;
        self.expect(Token::RParen)?;
        self.expect(Token::LBrace)?;
        let mut cases = vec![];
        loop {
            let tok = self.peek()?;
            match tok.token {
                Token::RBrace => {
                    self.next()?;
                    break;
                }
                Token::Eof => break,
                Token::Case => {
                    self.next()?;
                    let expr = self.parse_expr()?;
                    self.expect(Token::Colon)?;
                    let body = self.parse_case_body(model)?;
                    cases.push((SwitchCase::Case(expr), body));
                }
                Token::Default => {
                    self.next()?;
                    self.expect(Token::Colon)?;
                    let body = self.parse_case_body(model)?;
                    cases.push((SwitchCase::Default, body));
                }
                other => {
                    self.warn(tok.pos, format!("unexpected token in switch: {:?}", other));
                    self.skip_to_semi();
                }
            }
        }
        Ok(Stmt::Switch { subject, cases })
    }

    fn parse_case_body(&mut self, model: &mut Model) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![];
        loop {
            match self.peek()?.token {
                Token::Case | Token::Default | Token::RBrace | Token::Eof => break,
                _ => match self.parse_scope_statement(model) {
                    Ok(s) => stmts.push(s),
                    Err(w) => {
                        self.warn(w.pos, w.message);
                        self.skip_to_semi();
                    }
                },
            }
        }
        Ok(stmts)
    }

    /// `on commit|expiry|release [or ...] { <stmt>* }`
    fn parse_on(&mut self, model: &mut Model) -> PResult<Stmt> {
        let mut events = vec![self.parse_hook_event()?];
        while self.peek()?.token == Token::Or {
            self.next()?;
            events.push(self.parse_hook_event()?);
        }
        self.expect(Token::LBrace)?;
        let body = self.parse_stmt_list(model)?;
        Ok(Stmt::On { events, body })
    }

    fn parse_hook_event(&mut self) -> PResult<HookEvent> {
        let tok = self.next()?;
        match tok.token {
            Token::Commit => Ok(HookEvent::Commit),
            Token::Expiry => Ok(HookEvent::Expiry),
            Token::Release => Ok(HookEvent::Release),
            other => Err(ParseWarning { pos: tok.pos, message: format!("expected a hook event (commit/expiry/release), found {:?}", other) }),
        }
    }

    fn parse_log(&mut self) -> PResult<Stmt> {
        self.expect(Token::LParen)?;
        let level_tok = self.next()?;
        let priority = match level_tok.token {
            Token::Name(n) if n == "fatal" => LogPriority::Fatal,
            _ => LogPriority::Info,
        };
        self.expect(Token::Comma)?;
        let message = self.parse_expr()?;
        self.expect(Token::RParen)?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt::Log { priority, message })
    }

    fn parse_if(&mut self, model: &mut Model) -> PResult<Stmt> {
        let mut branches = vec![];
        let cond = self.parse_bool_expr()?;
        self.expect(Token::LBrace)?;
        let body = self.parse_stmt_list(model)?;
        branches.push((cond, body));
        let mut otherwise = vec![];
        loop {
            match self.peek()?.token {
                Token::Elsif => {
                    self.next()?;
                    let cond = self.parse_bool_expr()?;
                    self.expect(Token::LBrace)?;
                    let body = self.parse_stmt_list(model)?;
                    branches.push((cond, body));
                }
                Token::Else => {
                    self.next()?;
                    self.expect(Token::LBrace)?;
                    otherwise = self.parse_stmt_list(model)?;
                    break;
                }
                _ => break,
            }
        }
        Ok(Stmt::If { branches, otherwise })
    }

    fn parse_stmt_list(&mut self, model: &mut Model) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![];
        loop {
            match self.peek()?.token {
                Token::RBrace => {
                    self.next()?;
                    break;
                }
                Token::Eof => break,
                _ => match self.parse_scope_statement(model) {
                    Ok(s) => stmts.push(s),
                    Err(w) => {
                        self.warn(w.pos, w.message);
                        self.skip_to_rbrace();
                        break;
                    }
                },
            }
        }
        Ok(stmts)
    }

    fn parse_bool_expr(&mut self) -> PResult<Expr> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_and_expr()?;
        while self.peek()?.token == Token::Or || self.peek()?.token == Token::OrOr {
            self.next()?;
            let rhs = self.parse_and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_equality_expr()?;
        while self.peek()?.token == Token::And || self.peek()?.token == Token::AndAnd {
            self.next()?;
            let rhs = self.parse_equality_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality_expr(&mut self) -> PResult<Expr> {
        let lhs = self.parse_unary_bool_expr()?;
        match self.peek()?.token {
            Token::Eq => {
                self.next()?;
                let rhs = self.parse_expr()?;
                Ok(Expr::Equal(Box::new(lhs), Box::new(rhs)))
            }
            Token::Ne => {
                self.next()?;
                let rhs = self.parse_expr()?;
                Ok(Expr::NotEqual(Box::new(lhs), Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_unary_bool_expr(&mut self) -> PResult<Expr> {
        match self.peek()?.token {
            Token::Not | Token::Bang => {
                self.next()?;
                Ok(Expr::Not(Box::new(self.parse_unary_bool_expr()?)))
            }
            Token::Exists => {
                self.next()?;
                let name_tok = self.next()?;
                let name = match name_tok.token {
                    Token::Name(n) => n,
                    other => {
                        return Err(ParseWarning { pos: name_tok.pos, message: format!("expected an option name, found {:?}", other) })
                    }
                };
                let option = dhcppkt::name_to_option(&name).unwrap_or_else(|| DhcpOption::new(0));
                Ok(Expr::ExistsOption(option))
            }
            Token::Known => {
                self.next()?;
                Ok(Expr::Known)
            }
            Token::LParen => {
                self.next()?;
                let e = self.parse_or_expr()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            _ => self.parse_expr(),
        }
    }

    /// Data/numeric-context expressions: concat, substring, pick-first,
    /// encode/decode helpers, option references, and literals.
    pub fn parse_expr(&mut self) -> PResult<Expr> {
        let lhs = self.parse_primary_expr()?;
        if self.peek()?.token == Token::Comma {
            // Bare `a, b, c` in an option value position is concatenation
            // sugar equivalent to `concat(a, b, c)`.
            let mut parts = vec![lhs];
            while self.peek()?.token == Token::Comma {
                self.next()?;
                parts.push(self.parse_primary_expr()?);
            }
            return Ok(Expr::Concat(parts));
        }
        Ok(lhs)
    }

    fn parse_primary_expr(&mut self) -> PResult<Expr> {
        let tok = self.next()?;
        match tok.token {
            Token::Text(s) => Ok(Expr::ConstString(s)),
            Token::Number(n) => Ok(Expr::ConstNumber(n)),
            Token::Ip(a) => Ok(Expr::ConstIp(a)),
            Token::HexNumber(b) => Ok(Expr::ConstData(b)),
            Token::Option => {
                let name_tok = self.next()?;
                let name = match name_tok.token {
                    Token::Name(n) => n,
                    other => return Err(ParseWarning { pos: name_tok.pos, message: format!("expected an option name, found {:?}", other) }),
                };
                let option = dhcppkt::name_to_option(&name).unwrap_or_else(|| DhcpOption::new(0));
                Ok(Expr::Option(option))
            }
            Token::Name(n) if n == "concat" => self.parse_call(|args| Expr::Concat(args)),
            Token::Name(n) if n == "pick-first-value" => self.parse_call(Expr::PickFirstValue),
            Token::Name(n) if n == "substring" => {
                self.expect(Token::LParen)?;
                let base = self.parse_expr()?;
                self.expect(Token::Comma)?;
                let offset = self.parse_expr()?;
                self.expect(Token::Comma)?;
                let len = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Substring { base: Box::new(base), offset: Box::new(offset), len: Box::new(len) })
            }
            Token::Name(n) if n == "suffix" => {
                self.expect(Token::LParen)?;
                let base = self.parse_expr()?;
                self.expect(Token::Comma)?;
                let len = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Suffix { base: Box::new(base), len: Box::new(len) })
            }
            Token::Name(n) => Ok(Expr::ConstString(n)),
            other => Err(ParseWarning { pos: tok.pos, message: format!("unexpected token in expression: {:?}", other) }),
        }
    }

    fn parse_call(&mut self, make: impl FnOnce(Vec<Expr>) -> Expr) -> PResult<Expr> {
        self.expect(Token::LParen)?;
        let mut args = vec![];
        loop {
            args.push(self.parse_primary_expr()?);
            if self.peek()?.token == Token::Comma {
                self.next()?;
            } else {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(make(args))
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_host_with_fixed_address() {
        let src = "host foo { hardware ethernet 00:11:22:33:44:55; fixed-address 10.0.0.5; }";
        let (model, warnings) = Parser::new(src).parse();
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(model.hosts.len(), 1);
        assert_eq!(model.hosts[0].fixed_address, Some("10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn parses_a_subnet_with_a_pool_range() {
        let src = "subnet 10.0.0.0/24 { pool { range 10.0.0.10 10.0.0.100; allow known; } }";
        let (model, warnings) = Parser::new(src).parse();
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(model.subnets.len(), 1);
    }

    #[test]
    fn resyncs_after_a_malformed_statement(){
        let src = "host a { !!! garbage !!! } host b { fixed-address 10.0.0.9; }";
        let (model, warnings) = Parser::new(src).parse();
        assert!(!warnings.is_empty());
        assert!(model.hosts.iter().any(|h| h.name == "b"));
    }

    #[test]
    fn parses_option_supersede() {
        let src = "option domain-name = \"example.com\";";
        let (model, warnings) = Parser::new(src).parse();
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(model.top.statements.len(), 1);
    }

    #[test]
    fn parses_if_known_condition() {
        let src = "if known { default-lease-time 600; } else { default-lease-time 120; }";
        let (model, warnings) = Parser::new(src).parse();
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert!(matches!(model.top.statements[0], Stmt::If { .. }));
    }

    #[test]
    fn parses_class_match_spawn_and_lease_limit() {
        let src = r#"class "foo" { match if known; spawn with option host-name; lease limit 5; }"#;
        let (model, warnings) = Parser::new(src).parse();
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(model.classes.len(), 1);
        assert!(model.classes[0].matches.is_some());
        assert!(model.classes[0].spawn_with.is_some());
        assert_eq!(model.classes[0].lease_limit, Some(5));
    }

    #[test]
    fn parses_on_commit_hook_with_set() {
        let src = r#"on commit { set greeting = "hi"; }"#;
        let (model, warnings) = Parser::new(src).parse();
        assert!(warnings.is_empty(), "{:?}", warnings);
        match &model.top.statements[0] {
            Stmt::On { events, body } => {
                assert_eq!(events, &vec![HookEvent::Commit]);
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected Stmt::On, got {:?}", other),
        }
    }

    #[test]
    fn parses_switch_with_default_case() {
        let src = r#"switch (option host-name) { case "a": break; default: break; }"#;
        let (model, warnings) = Parser::new(src).parse();
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert!(matches!(model.top.statements[0], Stmt::Switch { .. }));
    }

    #[test]
    fn parses_unset_and_add_class() {
        let src = "unset option host-name; add foo;";
        let (model, warnings) = Parser::new(src).parse();
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert!(matches!(model.top.statements[0], Stmt::Unset(_)));
        assert!(matches!(model.top.statements[1], Stmt::AddClass(ref n) if n == "foo"));
    }
}
