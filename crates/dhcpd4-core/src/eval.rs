/*  Expression/statement evaluation engine, spec.md §4.3. Evaluation never
 *  hard-fails: a context mismatch or an undefined reference just yields
 *  that context's empty value (`crate::error::EvalError` exists purely
 *  for logging, confirmed against `original_source/parse.c`'s
 *  `evaluate_boolean_expression`/`evaluate_data_expression`, which return
 *  a tri-state "not ready"/"false"/"true" rather than propagating an
 *  error up the call stack).
 */
use crate::config::ast::{EvalContext, Expr, HookEvent, LogPriority, Stmt, SwitchCase};
use crate::dhcp::dhcppkt::{Dhcp, DhcpOption, DhcpOptionTypeValue, DhcpOptions};
use crate::error::EvalError;
use crate::lease::Lease;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Data(Vec<u8>),
    Number(i64),
    Bool(bool),
}

impl Value {
    fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0,
            Value::Data(d) => !d.is_empty(),
        }
    }

    fn as_data(&self) -> Vec<u8> {
        match self {
            Value::Data(d) => d.clone(),
            Value::Number(n) => n.to_be_bytes().to_vec(),
            Value::Bool(b) => vec![*b as u8],
        }
    }

    fn as_number(&self) -> i64 {
        match self {
            Value::Number(n) => *n,
            Value::Data(d) => d.iter().fold(0i64, |acc, &b| (acc << 8) | b as i64),
            Value::Bool(b) => *b as i64,
        }
    }
}

/// Everything an expression might need to resolve itself: the inbound
/// request (for `option`/`exists`/packet-field references) and whether
/// the client matched a known host declaration (for the `known` literal).
/// `request` is `None` when a hook fires with no packet in scope (the
/// housekeeping sweep's `on expiry`) — expressions that don't reach into
/// the packet still evaluate fine in that case.
pub struct EvalEnv<'a> {
    pub request: Option<&'a Dhcp>,
    pub known: bool,
}

pub fn eval(expr: &Expr, env: &EvalEnv, ctx: EvalContext) -> Result<Value, EvalError> {
    let v = eval_inner(expr, env)?;
    Ok(match ctx {
        EvalContext::Boolean => Value::Bool(v.as_bool()),
        EvalContext::Numeric => Value::Number(v.as_number()),
        EvalContext::Data | EvalContext::Dns | EvalContext::Any => v,
    })
}

fn eval_inner(expr: &Expr, env: &EvalEnv) -> Result<Value, EvalError> {
    Ok(match expr {
        Expr::ConstData(d) => Value::Data(d.clone()),
        Expr::ConstString(s) => Value::Data(s.as_bytes().to_vec()),
        Expr::ConstNumber(n) => Value::Number(*n),
        Expr::ConstIp(ip) => Value::Data(ip.octets().to_vec()),
        Expr::Known => Value::Bool(env.known),
        Expr::Option(opt) => match env.request.and_then(|r| r.options.get_raw_option(opt)) {
            Some(raw) => Value::Data(raw.to_vec()),
            None => return Err(EvalError::Undefined),
        },
        Expr::ExistsOption(opt) => Value::Bool(env.request.and_then(|r| r.options.get_raw_option(opt)).is_some()),
        Expr::PacketField(name) => match (env.request, name.as_str()) {
            (Some(r), "ciaddr") => Value::Data(r.ciaddr.octets().to_vec()),
            (Some(r), "giaddr") => Value::Data(r.giaddr.octets().to_vec()),
            (Some(r), "chaddr") => Value::Data(r.chaddr.clone()),
            _ => return Err(EvalError::Undefined),
        },
        Expr::Substring { base, offset, len } => {
            let data = eval_inner(base, env)?.as_data();
            let off = eval_inner(offset, env)?.as_number().max(0) as usize;
            let l = eval_inner(len, env)?.as_number().max(0) as usize;
            let end = (off + l).min(data.len());
            Value::Data(data.get(off.min(data.len())..end).unwrap_or(&[]).to_vec())
        }
        Expr::Suffix { base, len } => {
            let data = eval_inner(base, env)?.as_data();
            let l = eval_inner(len, env)?.as_number().max(0) as usize;
            let start = data.len().saturating_sub(l);
            Value::Data(data[start..].to_vec())
        }
        Expr::Concat(parts) => {
            let mut out = vec![];
            for p in parts {
                out.extend(eval_inner(p, env)?.as_data());
            }
            Value::Data(out)
        }
        Expr::PickFirstValue(parts) => {
            for p in parts {
                if let Ok(v) = eval_inner(p, env) {
                    let data = v.as_data();
                    if !data.is_empty() {
                        return Ok(v);
                    }
                }
            }
            return Err(EvalError::Undefined);
        }
        Expr::BinaryToAscii { base, width, separator } => {
            let data = eval_inner(base, env)?.as_data();
            let w = (*width as usize).max(1);
            let text = data
                .chunks(w)
                .map(|chunk| {
                    let n = chunk.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
                    n.to_string()
                })
                .collect::<Vec<_>>()
                .join(separator);
            Value::Data(text.into_bytes())
        }
        Expr::ExtractInt { base, width } => {
            let data = eval_inner(base, env)?.as_data();
            let n = data
                .iter()
                .take(*width as usize / 8)
                .fold(0i64, |acc, &b| (acc << 8) | b as i64);
            Value::Number(n)
        }
        Expr::EncodeInt { base, width } => {
            let n = eval_inner(base, env)?.as_number();
            let bytes = n.to_be_bytes();
            let w = (*width as usize / 8).min(8);
            Value::Data(bytes[8 - w..].to_vec())
        }
        Expr::Not(e) => Value::Bool(!eval_inner(e, env)?.as_bool()),
        Expr::And(a, b) => Value::Bool(eval_inner(a, env)?.as_bool() && eval_inner(b, env)?.as_bool()),
        Expr::Or(a, b) => Value::Bool(eval_inner(a, env)?.as_bool() || eval_inner(b, env)?.as_bool()),
        Expr::Equal(a, b) => Value::Bool(eval_inner(a, env)?.as_data() == eval_inner(b, env)?.as_data()),
        Expr::NotEqual(a, b) => Value::Bool(eval_inner(a, env)?.as_data() != eval_inner(b, env)?.as_data()),
    })
}

/// Applies a statement list (one scope's worth, already ordered
/// least-to-most-specific by the caller) against a reply-in-progress,
/// implementing the four option merge verbs (spec.md §4.3).
pub fn apply_statements(stmts: &[Stmt], env: &EvalEnv, reply: &mut DhcpOptions) {
    for stmt in stmts {
        apply_statement(stmt, env, reply);
    }
}

fn apply_statement(stmt: &Stmt, env: &EvalEnv, reply: &mut DhcpOptions) {
    match stmt {
        Stmt::Default { option, value } => {
            if reply.get_raw_option(option).is_none() {
                set_from_expr(reply, *option, value, env);
            }
        }
        Stmt::Supersede { option, value } => {
            set_from_expr(reply, *option, value, env);
        }
        Stmt::Append { option, value } => {
            let addition = eval(value, env, EvalContext::Data).map(|v| v.as_data()).unwrap_or_default();
            let mut existing = reply.get_raw_option(option).map(|b| b.to_vec()).unwrap_or_default();
            existing.extend(addition);
            reply.mutate_option_value(option, &DhcpOptionTypeValue::Unknown(existing));
        }
        Stmt::Prepend { option, value } => {
            let mut addition = eval(value, env, EvalContext::Data).map(|v| v.as_data()).unwrap_or_default();
            let existing = reply.get_raw_option(option).map(|b| b.to_vec()).unwrap_or_default();
            addition.extend(existing);
            reply.mutate_option_value(option, &DhcpOptionTypeValue::Unknown(addition));
        }
        Stmt::Unset(option) => {
            *reply = std::mem::take(reply).remove_option(option);
        }
        Stmt::If { branches, otherwise } => {
            for (cond, body) in branches {
                if eval(cond, env, EvalContext::Boolean).map(|v| v.as_bool()).unwrap_or(false) {
                    apply_statements(body, env, reply);
                    return;
                }
            }
            apply_statements(otherwise, env, reply);
        }
        Stmt::Switch { subject, cases } => apply_switch(subject, cases, env, reply),
        Stmt::Break => {}
        Stmt::Log { priority, message } => {
            let text = eval(message, env, EvalContext::Data)
                .map(|v| String::from_utf8_lossy(&v.as_data()).to_string())
                .unwrap_or_default();
            match priority {
                LogPriority::Fatal => log::error!("{}", text),
                LogPriority::Info => log::info!("{}", text),
            }
        }
        // Binding-scope/hook/class-assignment forms have no meaning while
        // building a reply's option set; they only act through
        // `fire_hooks` (lease transitions) or the allocation engine.
        Stmt::Set { .. } | Stmt::On { .. } | Stmt::AddClass(_) => {}
        Stmt::Eval(expr) => {
            let _ = eval(expr, env, EvalContext::Any);
        }
        Stmt::Statements(body) => apply_statements(body, env, reply),
    }
}

fn apply_switch(subject: &Expr, cases: &[(SwitchCase, Vec<Stmt>)], env: &EvalEnv, reply: &mut DhcpOptions) {
    let Ok(subj) = eval(subject, env, EvalContext::Any) else { return };
    let mut default_body = None;
    for (case, body) in cases {
        match case {
            SwitchCase::Case(expr) => {
                if eval(expr, env, EvalContext::Any).map(|v| v == subj).unwrap_or(false) {
                    apply_statements(body, env, reply);
                    return;
                }
            }
            SwitchCase::Default => default_body = Some(body),
        }
    }
    if let Some(body) = default_body {
        apply_statements(body, env, reply);
    }
}

/// Walks a scope's statement list looking for `on <event> { ... }` hooks,
/// executing each matching hook body against `lease`'s binding scope
/// (spec.md §4.5/§4.6). Called from `handlers.rs`/`server.rs` at the same
/// points `lease.rs`'s `commit`/`release`/`expire` transitions run.
pub fn fire_hooks(stmts: &[Stmt], event: HookEvent, env: &EvalEnv, lease: &mut Lease) {
    for stmt in stmts {
        match stmt {
            Stmt::On { events, body } => {
                if events.contains(&event) {
                    execute_hook_body(body, env, lease);
                }
            }
            Stmt::If { branches, otherwise } => {
                let mut matched = false;
                for (cond, body) in branches {
                    if eval(cond, env, EvalContext::Boolean).map(|v| v.as_bool()).unwrap_or(false) {
                        fire_hooks(body, event, env, lease);
                        matched = true;
                        break;
                    }
                }
                if !matched {
                    fire_hooks(otherwise, event, env, lease);
                }
            }
            Stmt::Statements(body) => fire_hooks(body, event, env, lease),
            _ => {}
        }
    }
}

/// Executes a hook body: only `set`, nested conditionals/blocks, and
/// `log` make sense once a lease transition (not a reply) is what's being
/// built. Anything else (option verbs, nested `on`, `add`) is a no-op
/// here, matching how `apply_statement` ignores `set`/`on` in turn.
fn execute_hook_body(stmts: &[Stmt], env: &EvalEnv, lease: &mut Lease) {
    for stmt in stmts {
        match stmt {
            Stmt::Set { var, value } => {
                if let Ok(v) = eval(value, env, EvalContext::Data) {
                    lease.bindings.insert(var.clone(), v.as_data());
                }
            }
            Stmt::If { branches, otherwise } => {
                let mut matched = false;
                for (cond, body) in branches {
                    if eval(cond, env, EvalContext::Boolean).map(|v| v.as_bool()).unwrap_or(false) {
                        execute_hook_body(body, env, lease);
                        matched = true;
                        break;
                    }
                }
                if !matched {
                    execute_hook_body(otherwise, env, lease);
                }
            }
            Stmt::Statements(body) => execute_hook_body(body, env, lease),
            Stmt::Log { priority, message } => {
                let text = eval(message, env, EvalContext::Data)
                    .map(|v| String::from_utf8_lossy(&v.as_data()).to_string())
                    .unwrap_or_default();
                match priority {
                    LogPriority::Fatal => log::error!("{}", text),
                    LogPriority::Info => log::info!("{}", text),
                }
            }
            _ => {}
        }
    }
}

fn set_from_expr(reply: &mut DhcpOptions, option: DhcpOption, value: &Expr, env: &EvalEnv) {
    if let Ok(v) = eval(value, env, EvalContext::Data) {
        reply.mutate_option_value(&option, &DhcpOptionTypeValue::Unknown(v.as_data()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::dhcppkt::{self, OP_BOOTREQUEST};
    use std::net::Ipv4Addr;

    fn sample_request() -> Dhcp {
        Dhcp {
            op: OP_BOOTREQUEST,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 1,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: vec![1, 2, 3, 4, 5, 6],
            sname: vec![],
            file: vec![],
            options: DhcpOptions::default(),
        }
    }

    #[test]
    fn concat_joins_data_values() {
        let env = EvalEnv { request: Some(&sample_request()), known: false };
        let expr = Expr::Concat(vec![Expr::ConstString("a".into()), Expr::ConstString("b".into())]);
        assert_eq!(eval(&expr, &env, EvalContext::Data).unwrap(), Value::Data(b"ab".to_vec()));
    }

    #[test]
    fn pick_first_value_skips_undefined() {
        let request = sample_request();
        let env = EvalEnv { request: Some(&request), known: false };
        let expr = Expr::PickFirstValue(vec![
            Expr::Option(dhcppkt::OPTION_HOSTNAME),
            Expr::ConstString("fallback".into()),
        ]);
        assert_eq!(eval(&expr, &env, EvalContext::Data).unwrap(), Value::Data(b"fallback".to_vec()));
    }

    #[test]
    fn default_does_not_override_existing_option() {
        let request = sample_request();
        let env = EvalEnv { request: Some(&request), known: false };
        let mut reply = DhcpOptions::default().set_raw_option(&dhcppkt::OPTION_DOMAINNAME, b"set.example");
        apply_statement(
            &Stmt::Default { option: dhcppkt::OPTION_DOMAINNAME, value: Expr::ConstString("fallback.example".into()) },
            &env,
            &mut reply,
        );
        assert_eq!(reply.get_raw_option(&dhcppkt::OPTION_DOMAINNAME), Some(b"set.example".as_slice()));
    }

    #[test]
    fn append_extends_existing_bytes() {
        let request = sample_request();
        let env = EvalEnv { request: Some(&request), known: false };
        let mut reply = DhcpOptions::default().set_raw_option(&dhcppkt::OPTION_HOSTNAME, b"host");
        apply_statement(
            &Stmt::Append { option: dhcppkt::OPTION_HOSTNAME, value: Expr::ConstString("-suffix".into()) },
            &env,
            &mut reply,
        );
        assert_eq!(reply.get_raw_option(&dhcppkt::OPTION_HOSTNAME), Some(b"host-suffix".as_slice()));
    }

    #[test]
    fn switch_runs_only_the_first_matching_case() {
        let request = sample_request();
        let env = EvalEnv { request: Some(&request), known: false };
        let mut reply = DhcpOptions::default();
        let stmt = Stmt::Switch {
            subject: Expr::ConstNumber(2),
            cases: vec![
                (SwitchCase::Case(Expr::ConstNumber(1)), vec![Stmt::Supersede { option: dhcppkt::OPTION_HOSTNAME, value: Expr::ConstString("one".into()) }]),
                (SwitchCase::Case(Expr::ConstNumber(2)), vec![Stmt::Supersede { option: dhcppkt::OPTION_HOSTNAME, value: Expr::ConstString("two".into()) }]),
                (SwitchCase::Default, vec![Stmt::Supersede { option: dhcppkt::OPTION_HOSTNAME, value: Expr::ConstString("other".into()) }]),
            ],
        };
        apply_statement(&stmt, &env, &mut reply);
        assert_eq!(reply.get_raw_option(&dhcppkt::OPTION_HOSTNAME), Some(b"two".as_slice()));
    }

    #[test]
    fn on_expiry_hook_populates_lease_bindings() {
        let env = EvalEnv { request: None, known: false };
        let mut lease = Lease::free("10.0.0.5".parse().unwrap());
        let stmts = vec![Stmt::On {
            events: vec![HookEvent::Expiry],
            body: vec![Stmt::Set { var: "farewell".into(), value: Expr::ConstString("bye".into()) }],
        }];
        fire_hooks(&stmts, HookEvent::Expiry, &env, &mut lease);
        assert_eq!(lease.bindings.get("farewell"), Some(&b"bye".to_vec()));
    }

    #[test]
    fn on_commit_hook_does_not_fire_for_expiry() {
        let env = EvalEnv { request: None, known: false };
        let mut lease = Lease::free("10.0.0.5".parse().unwrap());
        let stmts = vec![Stmt::On {
            events: vec![HookEvent::Commit],
            body: vec![Stmt::Set { var: "x".into(), value: Expr::ConstString("y".into()) }],
        }];
        fire_hooks(&stmts, HookEvent::Expiry, &env, &mut lease);
        assert!(lease.bindings.is_empty());
    }
}
