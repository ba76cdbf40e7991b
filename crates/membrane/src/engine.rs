//! The apply-policy engine: wrap map, taming, and mediation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use policy::{Access, ArgRule, Decision, Perm, Table};

use crate::feral::{FeralObject, FeralValue};
use crate::{Error, Result};

type FilterFn = Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A registered table with its argument filters already resolved.
///
/// Resolution happens once, at [`Membrane::register_policy`]; the call
/// path never consults the filter registry, so a filter name re-registered
/// later has no effect on tables bound before it.
struct TypePolicy {
    table: Table,
    /// method -> resolved positional constraints.
    constraints: HashMap<String, Vec<Constraint>>,
}

/// An [`ArgRule`] with any filter reference replaced by its predicate.
enum Constraint {
    Any,
    OneOf(Vec<String>),
    Filter { name: String, predicate: FilterFn },
}

/// One wrapped feral instance: the object plus its registered policy.
struct Node {
    feral: Arc<dyn FeralObject>,
    policy: Arc<TypePolicy>,
}

/// A guest-visible handle to a wrapped feral object.
///
/// Cheap to clone; two handles wrap the same feral object exactly when
/// [`TamedRef::same`] holds, and repeated [`Membrane::wrap`] calls for one
/// feral object always yield handles to the same node.
#[derive(Clone)]
pub struct TamedRef {
    node: Arc<Node>,
}

impl TamedRef {
    /// The policy type tag of the underlying object.
    pub fn type_tag(&self) -> String {
        self.node.feral.type_tag().to_string()
    }

    /// Whether two handles refer to the same wrapped instance.
    pub fn same(&self, other: &TamedRef) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl fmt::Debug for TamedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TamedRef")
            .field("type_tag", &self.node.feral.type_tag())
            .finish()
    }
}

/// A value on the guest side of the boundary.
#[derive(Debug, Clone)]
pub enum TamedValue {
    /// Plain data, passed through by copy.
    Data(serde_json::Value),
    /// A tamed reference to a wrapped host object.
    Ref(TamedRef),
}

impl TamedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TamedValue::Data(value) => value.as_str(),
            TamedValue::Ref(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TamedValue::Data(value) => value.as_u64(),
            TamedValue::Ref(_) => None,
        }
    }

    pub fn as_tamed(&self) -> Option<&TamedRef> {
        match self {
            TamedValue::Data(_) => None,
            TamedValue::Ref(tamed) => Some(tamed),
        }
    }
}

impl From<serde_json::Value> for TamedValue {
    fn from(value: serde_json::Value) -> Self {
        TamedValue::Data(value)
    }
}

impl From<&str> for TamedValue {
    fn from(value: &str) -> Self {
        TamedValue::Data(value.into())
    }
}

impl From<u64> for TamedValue {
    fn from(value: u64) -> Self {
        TamedValue::Data(value.into())
    }
}

/// Strings compare as themselves, numbers by their decimal rendering,
/// nothing else matches a whitelist.
fn coerce_to_string(value: &TamedValue) -> Option<String> {
    match value {
        TamedValue::Data(serde_json::Value::String(s)) => Some(s.clone()),
        TamedValue::Data(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// The session-scoped taming registry and wrap map.
///
/// One membrane per host-integration session. Hosts register named filter
/// predicates first, then a policy table per exposed type tag, then wrap
/// feral instances as they cross to the guest. All state is explicit —
/// nothing here is process-global.
#[derive(Default)]
pub struct Membrane {
    policies: Mutex<HashMap<String, Arc<TypePolicy>>>,
    filters: Mutex<HashMap<String, FilterFn>>,
    /// feral identity -> wrapper. Weak on purpose: the association must
    /// not be the thing keeping either side alive.
    wrap_map: Mutex<HashMap<usize, Weak<Node>>>,
}

impl Membrane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named argument filter.
    ///
    /// Filters are host predicates over data values, referenced from
    /// policy tables by name. Register them before the tables that use
    /// them.
    pub fn register_filter<F>(&self, name: impl Into<String>, filter: F)
    where
        F: Fn(&serde_json::Value) -> bool + Send + Sync + 'static,
    {
        lock(&self.filters).insert(name.into(), Arc::new(filter));
    }

    /// Register the policy table for a type tag.
    ///
    /// Validates the table and resolves every filter reference into its
    /// predicate; a table naming an unregistered filter is rejected here
    /// rather than at first call, and later re-registrations of a filter
    /// name do not reach tables already bound. Re-registering a tag
    /// replaces the table for future wraps; existing wrappers keep the
    /// table they were bound to.
    pub fn register_policy(&self, type_tag: impl Into<String>, table: Table) -> Result<()> {
        let type_tag = type_tag.into();
        table.validate()?;

        let mut constraints = HashMap::new();
        {
            let filters = lock(&self.filters);
            for (member, rule) in &table.functions {
                let mut resolved = Vec::with_capacity(rule.args.len());
                for arg in &rule.args {
                    resolved.push(match arg {
                        ArgRule::Any => Constraint::Any,
                        ArgRule::OneOf(values) => Constraint::OneOf(values.clone()),
                        ArgRule::Filter(filter) => match filters.get(filter) {
                            Some(predicate) => Constraint::Filter {
                                name: filter.clone(),
                                predicate: Arc::clone(predicate),
                            },
                            None => {
                                return Err(Error::UnknownFilter {
                                    type_tag,
                                    member: member.clone(),
                                    filter: filter.clone(),
                                });
                            }
                        },
                    });
                }
                constraints.insert(member.clone(), resolved);
            }
        }

        lock(&self.policies).insert(type_tag, Arc::new(TypePolicy { table, constraints }));
        Ok(())
    }

    fn policy_for(&self, type_tag: &str) -> Result<Arc<TypePolicy>> {
        lock(&self.policies)
            .get(type_tag)
            .cloned()
            .ok_or_else(|| Error::NoPolicy(type_tag.to_string()))
    }

    /// Wrap a feral object in a tamed reference.
    ///
    /// Idempotent per instance: wrapping the same object again returns a
    /// handle to the same node. Fails closed with [`Error::NoPolicy`] for
    /// unregistered types.
    pub fn wrap(&self, feral: Arc<dyn FeralObject>) -> Result<TamedRef> {
        let key = Arc::as_ptr(&feral) as *const () as usize;

        if let Some(node) = lock(&self.wrap_map).get(&key).and_then(Weak::upgrade) {
            return Ok(TamedRef { node });
        }

        let policy = self.policy_for(feral.type_tag())?;

        // Check-then-insert must be atomic so concurrent first wraps of
        // one object cannot produce two nodes.
        let mut map = lock(&self.wrap_map);
        if let Some(node) = map.get(&key).and_then(Weak::upgrade) {
            return Ok(TamedRef { node });
        }
        map.retain(|_, weak| weak.strong_count() > 0);
        let node = Arc::new(Node { feral, policy });
        map.insert(key, Arc::downgrade(&node));
        Ok(TamedRef { node })
    }

    /// Tame a feral value: data passes through, objects get wrapped.
    pub fn tame(&self, value: FeralValue) -> Result<TamedValue> {
        match value {
            FeralValue::Data(data) => Ok(TamedValue::Data(data)),
            FeralValue::Object(object) => Ok(TamedValue::Ref(self.wrap(object)?)),
        }
    }

    /// Untame a guest value back to feral form for the host side.
    pub fn untame(&self, value: TamedValue) -> FeralValue {
        match value {
            TamedValue::Data(data) => FeralValue::Data(data),
            TamedValue::Ref(tamed) => FeralValue::Object(Arc::clone(&tamed.node.feral)),
        }
    }

    /// Read a property through the policy.
    ///
    /// Object results are recursively tamed before they reach the guest.
    pub fn get_property(&self, tamed: &TamedRef, name: &str) -> Result<TamedValue> {
        let node = &tamed.node;
        if let Decision::Deny { reason } = node.policy.table.decide_read(name) {
            return Err(self.denied(node, name, reason));
        }
        // No membrane lock is held while feral code runs.
        let value = node.feral.get(name)?;
        self.tame(value)
    }

    /// Write a property through the policy.
    pub fn set_property(&self, tamed: &TamedRef, name: &str, value: TamedValue) -> Result<()> {
        let node = &tamed.node;
        let table = &node.policy.table;

        let writable = table
            .property(name)
            .is_some_and(|rule| rule.perm == Perm::Allow && rule.access == Access::Write);
        if !writable {
            let reason = match table.decide_write(name, None) {
                Decision::Deny { reason } => reason,
                Decision::Allow => "write denied".to_string(),
            };
            return Err(self.denied(node, name, reason));
        }

        if let Some(values) = table.property(name).and_then(|r| r.allowed_values.as_ref()) {
            let allowed = coerce_to_string(&value)
                .is_some_and(|coerced| values.iter().any(|v| *v == coerced));
            if !allowed {
                return Err(Error::ValueNotAllowed {
                    type_tag: node.feral.type_tag().to_string(),
                    member: name.to_string(),
                });
            }
        }

        let feral_value = self.untame(value);
        node.feral.set(name, feral_value)?;
        Ok(())
    }

    /// Invoke a method through the policy.
    ///
    /// Constrained positions are validated in order; arguments past the
    /// declared list pass unconstrained. Arguments are untamed before the
    /// feral method runs and the result is tamed on the way back.
    pub fn call(&self, tamed: &TamedRef, method: &str, args: Vec<TamedValue>) -> Result<TamedValue> {
        let node = &tamed.node;
        if let Decision::Deny { reason } = node.policy.table.decide_call(method) {
            return Err(self.denied(node, method, reason));
        }

        if let Some(constraints) = node.policy.constraints.get(method) {
            for (index, constraint) in constraints.iter().enumerate() {
                let Some(arg) = args.get(index) else {
                    return Err(self.rejected(node, method, index, "missing argument for constrained position"));
                };
                match constraint {
                    Constraint::Any => {}
                    Constraint::OneOf(values) => {
                        let allowed = coerce_to_string(arg)
                            .is_some_and(|coerced| values.iter().any(|v| *v == coerced));
                        if !allowed {
                            return Err(self.rejected(node, method, index, "not in the allowed set"));
                        }
                    }
                    Constraint::Filter { name, predicate } => {
                        let TamedValue::Data(data) = arg else {
                            return Err(self.rejected(
                                node,
                                method,
                                index,
                                &format!("filter '{name}' applies to data values"),
                            ));
                        };
                        // The filter is host code; no membrane lock is held.
                        if !predicate(data) {
                            return Err(self.rejected(
                                node,
                                method,
                                index,
                                &format!("rejected by filter '{name}'"),
                            ));
                        }
                    }
                }
            }
        }

        let feral_args = args.into_iter().map(|arg| self.untame(arg)).collect();
        let result = node.feral.call(method, feral_args)?;
        self.tame(result)
    }

    fn denied(&self, node: &Node, member: &str, reason: String) -> Error {
        Error::AccessDenied {
            type_tag: node.feral.type_tag().to_string(),
            member: member.to_string(),
            reason,
        }
    }

    fn rejected(&self, node: &Node, member: &str, index: usize, reason: &str) -> Error {
        Error::ArgumentRejected {
            type_tag: node.feral.type_tag().to_string(),
            member: member.to_string(),
            index,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Debug for Membrane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Membrane")
            .field("policies", &lock(&self.policies).len())
            .field("wrapped", &lock(&self.wrap_map).len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feral::FeralError;

    /// Host-side gadget used as the feral fixture. Everything it exposes
    /// ferally is reachable directly; the tests check what survives the
    /// membrane.
    struct Widget {
        label: Mutex<String>,
        gauge: Arc<Gauge>,
    }

    impl Widget {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                label: Mutex::new("12".to_string()),
                gauge: Arc::new(Gauge { reading: 7 }),
            })
        }

        // Internal helper, denied at the boundary but reachable from
        // allowed methods.
        fn secret_word(&self) -> String {
            "klaatu".to_string()
        }
    }

    impl FeralObject for Widget {
        fn type_tag(&self) -> &str {
            "widget"
        }

        fn get(&self, property: &str) -> std::result::Result<FeralValue, FeralError> {
            match property {
                "label" => Ok(lock(&self.label).clone().as_str().into()),
                "size" => Ok(42u64.into()),
                "version" => Ok("9.9".into()),
                "gauge" => Ok(FeralValue::Object(self.gauge.clone())),
                other => Err(FeralError::NoSuchProperty(other.to_string())),
            }
        }

        fn set(&self, property: &str, value: FeralValue) -> std::result::Result<(), FeralError> {
            match property {
                "label" => {
                    let FeralValue::Data(data) = value else {
                        return Err(FeralError::Other("label must be data".into()));
                    };
                    let text = match data {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    *lock(&self.label) = text;
                    Ok(())
                }
                other => Err(FeralError::NoSuchProperty(other.to_string())),
            }
        }

        fn call(
            &self,
            method: &str,
            args: Vec<FeralValue>,
        ) -> std::result::Result<FeralValue, FeralError> {
            match method {
                "high_five" => Ok(format!("high five x{}", args.len()).as_str().into()),
                "describe" => {
                    // Intra-object call to a member the policy denies.
                    Ok(format!("widget[{}]", self.secret_word()).as_str().into())
                }
                "secret_word" => Ok(self.secret_word().as_str().into()),
                "gauge" => Ok(FeralValue::Object(self.gauge.clone())),
                "owns" => {
                    let Some(FeralValue::Object(candidate)) = args.into_iter().next() else {
                        return Err(FeralError::Other("expected an object argument".into()));
                    };
                    let mine = Arc::as_ptr(&candidate) as *const ()
                        == Arc::as_ptr(&(self.gauge.clone() as Arc<dyn FeralObject>)) as *const ();
                    Ok(FeralValue::Data(mine.into()))
                }
                other => Err(FeralError::NoSuchMethod(other.to_string())),
            }
        }
    }

    struct Gauge {
        reading: u64,
    }

    impl FeralObject for Gauge {
        fn type_tag(&self) -> &str {
            "gauge"
        }

        fn get(&self, property: &str) -> std::result::Result<FeralValue, FeralError> {
            match property {
                "reading" => Ok(self.reading.into()),
                other => Err(FeralError::NoSuchProperty(other.to_string())),
            }
        }

        fn set(&self, property: &str, _: FeralValue) -> std::result::Result<(), FeralError> {
            Err(FeralError::NoSuchProperty(property.to_string()))
        }

        fn call(
            &self,
            method: &str,
            _: Vec<FeralValue>,
        ) -> std::result::Result<FeralValue, FeralError> {
            Err(FeralError::NoSuchMethod(method.to_string()))
        }
    }

    const WIDGET_POLICY: &str = r#"
[properties.label]
perm = "allow"
access = "write"
allowed_values = ["12", "13"]

[properties.size]
perm = "allow"

[properties.gauge]
perm = "allow"

[functions.high_five]
perm = "allow"
args = [{ one_of = ["5", "50"] }, { filter = "fivefilter" }]

[functions.describe]
perm = "allow"

[functions.owns]
perm = "allow"

[functions.secret_word]
perm = "deny"
comment = "internal"
"#;

    const GAUGE_POLICY: &str = r#"
[properties.reading]
perm = "allow"

[properties.calibration]
perm = "allow"
"#;

    fn membrane() -> Membrane {
        let membrane = Membrane::new();
        membrane.register_filter("fivefilter", |value: &serde_json::Value| {
            value.as_str().is_some_and(|s| s.contains('5'))
        });
        membrane
            .register_policy("widget", Table::parse(WIDGET_POLICY).unwrap())
            .unwrap();
        membrane
            .register_policy("gauge", Table::parse(GAUGE_POLICY).unwrap())
            .unwrap();
        membrane
    }

    #[test]
    fn default_deny_hides_feral_members() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();

        // "version" exists ferally but is not in the table.
        assert!(matches!(
            membrane.get_property(&tamed, "version"),
            Err(Error::AccessDenied { ref member, .. }) if member == "version"
        ));
        assert!(matches!(
            membrane.call(&tamed, "version", vec![]),
            Err(Error::AccessDenied { .. })
        ));
    }

    #[test]
    fn allowed_reads_pass_through() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();
        let size = membrane.get_property(&tamed, "size").unwrap();
        assert_eq!(size.as_u64(), Some(42));
    }

    #[test]
    fn wrap_is_identity_stable() {
        let membrane = membrane();
        let widget = Widget::new();
        let a = membrane.wrap(widget.clone() as Arc<dyn FeralObject>).unwrap();
        let b = membrane.wrap(widget as Arc<dyn FeralObject>).unwrap();
        assert!(a.same(&b));
    }

    #[test]
    fn recursive_taming_is_identity_stable_too() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();
        let first = membrane.get_property(&tamed, "gauge").unwrap();
        let second = membrane.get_property(&tamed, "gauge").unwrap();
        let (a, b) = (first.as_tamed().unwrap(), second.as_tamed().unwrap());
        assert!(a.same(b));
        assert_eq!(
            membrane.get_property(a, "reading").unwrap().as_u64(),
            Some(7)
        );
    }

    #[test]
    fn write_whitelist_enforced_end_to_end() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();

        assert!(matches!(
            membrane.set_property(&tamed, "label", "14".into()),
            Err(Error::ValueNotAllowed { ref member, .. }) if member == "label"
        ));
        assert_eq!(
            membrane.get_property(&tamed, "label").unwrap().as_str(),
            Some("12")
        );

        membrane.set_property(&tamed, "label", "13".into()).unwrap();
        assert_eq!(
            membrane.get_property(&tamed, "label").unwrap().as_str(),
            Some("13")
        );
    }

    #[test]
    fn numbers_coerce_against_whitelists() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();
        membrane.set_property(&tamed, "label", 12u64.into()).unwrap();
        assert_eq!(
            membrane.get_property(&tamed, "label").unwrap().as_str(),
            Some("12")
        );
    }

    #[test]
    fn read_only_and_undeclared_writes_denied() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();
        assert!(matches!(
            membrane.set_property(&tamed, "size", "1".into()),
            Err(Error::AccessDenied { .. })
        ));
        assert!(matches!(
            membrane.set_property(&tamed, "color", "red".into()),
            Err(Error::AccessDenied { .. })
        ));
    }

    #[test]
    fn argument_whitelist_enforced() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();

        let err = membrane
            .call(&tamed, "high_five", vec!["6".into(), "55".into()])
            .unwrap_err();
        assert!(matches!(err, Error::ArgumentRejected { index: 0, .. }));

        let result = membrane
            .call(&tamed, "high_five", vec!["5".into(), "55".into()])
            .unwrap();
        assert_eq!(result.as_str(), Some("high five x2"));
    }

    #[test]
    fn argument_filter_enforced() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();
        let err = membrane
            .call(&tamed, "high_five", vec!["50".into(), "66".into()])
            .unwrap_err();
        assert!(matches!(err, Error::ArgumentRejected { index: 1, .. }));
    }

    #[test]
    fn missing_constrained_argument_rejected() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();
        let err = membrane.call(&tamed, "high_five", vec!["5".into()]).unwrap_err();
        assert!(matches!(err, Error::ArgumentRejected { index: 1, .. }));
    }

    #[test]
    fn extra_arguments_pass_unconstrained() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();
        let result = membrane
            .call(
                &tamed,
                "high_five",
                vec!["5".into(), "55".into(), "anything".into()],
            )
            .unwrap();
        assert_eq!(result.as_str(), Some("high five x3"));
    }

    #[test]
    fn denied_method_stays_reachable_internally() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();

        // Direct call is denied at the boundary...
        assert!(matches!(
            membrane.call(&tamed, "secret_word", vec![]),
            Err(Error::AccessDenied { .. })
        ));
        // ...but an allowed method that calls it internally still works.
        let described = membrane.call(&tamed, "describe", vec![]).unwrap();
        assert_eq!(described.as_str(), Some("widget[klaatu]"));
    }

    #[test]
    fn arguments_are_untamed_before_the_feral_call() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();
        let gauge = membrane.get_property(&tamed, "gauge").unwrap();

        // The feral side receives its own raw gauge back, not a wrapper.
        let owns = membrane.call(&tamed, "owns", vec![gauge]).unwrap();
        assert!(matches!(
            owns,
            TamedValue::Data(serde_json::Value::Bool(true))
        ));
    }

    #[test]
    fn unregistered_type_fails_closed() {
        let membrane = Membrane::new();
        assert!(matches!(
            membrane.wrap(Widget::new()),
            Err(Error::NoPolicy(ref tag)) if tag == "widget"
        ));
    }

    #[test]
    fn unknown_filter_rejected_at_registration() {
        let membrane = Membrane::new();
        let table = Table::parse(
            r#"
[functions.f]
perm = "allow"
args = [{ filter = "nope" }]
"#,
        )
        .unwrap();
        assert!(matches!(
            membrane.register_policy("thing", table),
            Err(Error::UnknownFilter { ref filter, .. }) if filter == "nope"
        ));
    }

    #[test]
    fn filters_resolve_at_registration_time() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();
        // Replacing the named filter afterwards must not affect tables
        // that already resolved it.
        membrane.register_filter("fivefilter", |_: &serde_json::Value| false);
        let result = membrane
            .call(&tamed, "high_five", vec!["5".into(), "55".into()])
            .unwrap();
        assert_eq!(result.as_str(), Some("high five x2"));
    }

    #[test]
    fn feral_failures_surface_distinctly() {
        let membrane = membrane();
        let tamed = membrane.wrap(Widget::new()).unwrap();
        let gauge = membrane.get_property(&tamed, "gauge").unwrap();
        let gauge = gauge.as_tamed().unwrap();
        // "calibration" is allowed by the table but the object lacks it:
        // that is the object's failure, not a policy denial.
        assert!(matches!(
            membrane.get_property(gauge, "calibration"),
            Err(Error::Feral(FeralError::NoSuchProperty(_)))
        ));
    }

    #[test]
    fn dropped_wrappers_do_not_leak_map_entries() {
        let membrane = membrane();
        let widget = Widget::new();
        {
            let _tamed = membrane.wrap(widget.clone() as Arc<dyn FeralObject>).unwrap();
        }
        // The old entry is dead; wrapping again builds a fresh node.
        let again = membrane.wrap(widget as Arc<dyn FeralObject>).unwrap();
        assert_eq!(again.type_tag(), "widget");
        assert_eq!(lock(&membrane.wrap_map).len(), 1);
    }
}
