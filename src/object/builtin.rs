//! Built-in object types registered by the standalone daemon
//!
//! Embedding hosts register their own domain types; `tetherd` ships these
//! two so a fresh install has something to serve.

use crate::error::{ObjectError, ObjectResult};
use crate::object::{ObjectCatalog, RemoteObject};
use crate::output;
use crate::wire::value::{ObjectSpec, WireValue};

/// A counter with a configurable step
#[derive(Debug, Default)]
pub struct Counter {
    count: i64,
    step: i64,
}

impl Counter {
    fn from_spec(spec: &ObjectSpec) -> ObjectResult<Self> {
        let mut counter = Counter { count: 0, step: 1 };
        for (name, value) in &spec.fields {
            match name.as_str() {
                "count" => counter.count = int_field(spec, name, value)?,
                "step" => counter.step = int_field(spec, name, value)?,
                other => {
                    return Err(ObjectError::Construct {
                        type_tag: spec.type_tag.clone(),
                        detail: format!("unknown field '{}'", other),
                    });
                }
            }
        }
        Ok(counter)
    }
}

fn int_field(spec: &ObjectSpec, name: &str, value: &WireValue) -> ObjectResult<i64> {
    value.as_int().map_err(|_| ObjectError::Construct {
        type_tag: spec.type_tag.clone(),
        detail: format!("field '{}' must be an integer", name),
    })
}

impl RemoteObject for Counter {
    fn type_tag(&self) -> &str {
        "Counter"
    }

    fn describe(&self) -> ObjectSpec {
        ObjectSpec::new("Counter")
            .with_field("count", WireValue::Int(self.count))
            .with_field("step", WireValue::Int(self.step))
    }
}

/// Replies with whatever it was sent; handy for wire diagnostics
#[derive(Debug, Default)]
pub struct Echo;

impl RemoteObject for Echo {
    fn type_tag(&self) -> &str {
        "Echo"
    }

    fn describe(&self) -> ObjectSpec {
        ObjectSpec::new("Echo")
    }
}

/// Register the built-in types and their methods with `catalog`
pub fn register_builtins(catalog: &ObjectCatalog) {
    catalog.register("Counter", |spec| {
        Counter::from_spec(spec).map(|c| Box::new(c) as Box<dyn RemoteObject>)
    });
    catalog.register_method::<Counter, _>("Counter", "increment", |counter, args| {
        let delta = match args.first() {
            Some(value) => value.as_int().map_err(|err| ObjectError::Method {
                method: "increment".to_string(),
                detail: err.to_string(),
            })?,
            None => counter.step,
        };
        counter.count += delta;
        Ok(vec![WireValue::Int(counter.count)])
    });
    catalog.register_method::<Counter, _>("Counter", "value", |counter, _args| {
        Ok(vec![WireValue::Int(counter.count)])
    });
    catalog.register_method::<Counter, _>("Counter", "reset", |counter, _args| {
        counter.count = 0;
        Ok(Vec::new())
    });
    catalog.register_method::<Counter, _>("Counter", "announce", |counter, _args| {
        output::hub().log(1, &format!("counter at {}", counter.count));
        Ok(Vec::new())
    });

    catalog.register_default::<Echo>("Echo");
    catalog.register_method::<Echo, _>("Echo", "echo", |_echo, args| Ok(args));
    catalog.register_method::<Echo, _>("Echo", "ping", |_echo, _args| Ok(Vec::new()));
}
