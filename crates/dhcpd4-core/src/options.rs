/*  Option universe registry, spec.md §3/§9. A universe owns a numeric
 *  code space and knows how to decode/encode values in it; the DHCP
 *  universe's codes cross the wire (`dhcp::dhcppkt`), while codes a
 *  config file defines itself (`option NAME code N = TYPE;`) stay
 *  confined to evaluation and never need their own wire framing because
 *  they piggy-back on the DHCP universe's raw-bytes option 224-254
 *  vendor-private range in practice; here they're modeled generically so
 *  a future additional universe (vendor-encapsulated, agent sub-option)
 *  has somewhere to plug in without touching the evaluator.
 */
use crate::config::model::Model;
use crate::dhcp::dhcppkt::{self, DhcpOption, DhcpOptionType, DhcpOptionTypeValue};

/// Merges a config-defined option name registry on top of the static
/// DHCP option table, so `eval` can resolve both `option routers = ...`
/// and a site-local `option my-opt code 200 = ip-address;` the same way.
pub struct OptionRegistry<'m> {
    model: &'m Model,
}

impl<'m> OptionRegistry<'m> {
    pub fn new(model: &'m Model) -> Self {
        OptionRegistry { model }
    }

    pub fn resolve(&self, name: &str) -> Option<DhcpOption> {
        dhcppkt::name_to_option(name)
            .or_else(|| self.model.option_defs.iter().find(|(n, _)| n == name).map(|(_, o)| *o))
    }

    pub fn type_of(&self, option: &DhcpOption) -> DhcpOptionType {
        option.get_type().unwrap_or(DhcpOptionType::Unknown)
    }

    pub fn decode(&self, option: &DhcpOption, raw: &[u8]) -> Option<DhcpOptionTypeValue> {
        self.type_of(option).decode(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_and_custom_names() {
        let mut model = Model::new();
        model.option_defs.push(("site-flag".to_string(), DhcpOption::new(200)));
        let reg = OptionRegistry::new(&model);
        assert_eq!(reg.resolve("routers"), Some(dhcppkt::OPTION_ROUTERADDR));
        assert_eq!(reg.resolve("site-flag"), Some(DhcpOption::new(200)));
        assert_eq!(reg.resolve("no-such-option"), None);
    }
}
