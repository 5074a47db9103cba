//! # Command Interpreter
//!
//! Evaluates one chain against a single register and encodes what is left in
//! it. Any failure, protocol or thrown, ends the chain and becomes an
//! `exception` descriptor; no partial result is ever returned.
//!
//! The register remembers the object a value was read from, so a method read
//! with `member_get` and then called with `function_call` still runs with the
//! right receiver while keeping its own identity.

use metarpc::Command;
use metarpc::CommandChain;
use metarpc::ExceptionMeta;
use metarpc::HandleId;
use metarpc::Meta;

use crate::server::Scope;
use crate::server::decode::decode_arg;
use crate::server::decode::decode_args;
use crate::server::encode::ValueEncoder;
use crate::server::host::Host;
use crate::server::value::Completion;
use crate::server::value::ObjectRef;
use crate::server::value::Property;
use crate::server::value::Slot;
use crate::server::value::Throw;
use crate::server::value::Value;

#[derive(Default)]
struct Register {
    value: Value,
    /// The object `value` was read from, if it was read off one.
    receiver: Option<Value>,
}

impl Register {
    fn of(value: Value) -> Self {
        Self { value, receiver: None }
    }
}

pub struct Interpreter<'s> {
    scope: &'s Scope<'s>,
    host: &'s dyn Host,
}

impl<'s> Interpreter<'s> {
    pub fn new(scope: &'s Scope<'s>, host: &'s dyn Host) -> Self {
        Self { scope, host }
    }

    /// Runs `chain` and returns the descriptor of its final value.
    pub fn run(&self, chain: &CommandChain) -> Meta {
        let result = self
            .execute(&chain.commands)
            .and_then(|value| ValueEncoder::new(self.scope).encode(&value, chain.ends_in_call()));
        match result {
            Ok(meta) => meta,
            Err(thrown) => {
                tracing::debug!(session = %self.scope.session, error = %thrown, "chain threw");
                self.exception(thrown)
            }
        }
    }

    fn execute(&self, commands: &[Command]) -> Completion {
        let mut register = Register::default();
        for command in commands {
            register = self.step(register, command)?;
        }
        Ok(register.value)
    }

    fn step(&self, register: Register, command: &Command) -> Result<Register, Throw> {
        match command {
            Command::GetBuiltin { name } => self.host.builtin(name).map(Register::of),
            Command::GetGlobal { name } => self.host.global(name).map(Register::of),
            Command::GetCurrentWindow => self.host.current_window().map(Register::of),
            Command::GetCurrentWebContents => self.host.current_web_contents().map(Register::of),
            Command::Require { name } => self.host.load_module(name).map(Register::of),

            Command::MemberGet { name } => member_get(register.value, name),
            Command::MemberSet { name, value } => {
                let value = decode_arg(self.scope, value)?;
                register.value.set_member(name, value)?;
                Ok(Register::default())
            }
            Command::MemberCall { name, args } => {
                let args = decode_args(self.scope, args)?;
                self.member_call(&register.value, name, &args).map(Register::of)
            }
            Command::MemberConstruct { name, args } => {
                let args = decode_args(self.scope, args)?;
                member_construct(&register.value, name, &args).map(Register::of)
            }

            Command::RemoteObjectGet { id, name } => {
                let target = self.resolve(*id, || format!("Cannot get property '{}' on missing remote object {}", name, id))?;
                member_get(target.into(), name)
            }
            Command::RemoteObjectSet { id, name, value } => {
                let target = self.resolve(*id, || format!("Cannot set property '{}' on missing remote object {}", name, id))?;
                let value = decode_arg(self.scope, value)?;
                target.set(name, value)?;
                Ok(Register::default())
            }
            Command::RemoteObjectCall { id, name, args } => {
                let target = self.resolve(*id, || format!("Cannot call method '{}' on missing remote object {}", name, id))?;
                let args = decode_args(self.scope, args)?;
                self.member_call(&target.into(), name, &args).map(Register::of)
            }
            Command::RemoteObjectConstruct { id, name, args } => {
                let target = self.resolve(*id, || format!("Cannot call constructor '{}' on missing remote object {}", name, id))?;
                let args = decode_args(self.scope, args)?;
                member_construct(&target.into(), name, &args).map(Register::of)
            }

            Command::FunctionCall { id, args } => {
                let (callee, this) = match id {
                    Some(id) => {
                        let f = self.resolve(*id, || format!("Cannot call function on missing remote object {}", id))?;
                        (Value::Object(f), self.host.global_receiver())
                    }
                    None => {
                        let this = register.receiver.unwrap_or_else(|| self.host.global_receiver());
                        (register.value, this)
                    }
                };
                let args = decode_args(self.scope, args)?;
                self.invoke(&callee, &this, &args).map(Register::of)
            }
            Command::ConstructorCall { id, args } => {
                let constructor = match id {
                    Some(id) => {
                        Value::Object(self.resolve(*id, || format!("Cannot call constructor on missing remote object {}", id))?)
                    }
                    None => register.value,
                };
                let args = decode_args(self.scope, args)?;
                construct(&constructor, &args).map(Register::of)
            }
        }
    }

    fn resolve(&self, id: HandleId, message: impl FnOnce() -> String) -> Result<ObjectRef, Throw> {
        self.scope
            .registry
            .resolve(self.scope.session, id)
            .map_err(|e| Throw::rpc(format!("{} ({})", message(), e.reason())))
    }

    fn member_call(&self, target: &Value, name: &str, args: &[Value]) -> Completion {
        let method = target.get_member(name)?;
        self.invoke(&method, target, args)
    }

    /// Calls `callee`, re-wrapping anything it throws with the function's name.
    fn invoke(&self, callee: &Value, this: &Value, args: &[Value]) -> Completion {
        let Value::Object(f) = callee else {
            return Err(Throw::type_error(format!("{} is not a function", callee.display())));
        };
        if !f.is_callable() {
            return Err(Throw::type_error(format!("{} is not a function", callee.display())));
        }
        f.call(this, args).map_err(|thrown| wrap_call_error(f.function_name(), thrown))
    }

    fn exception(&self, thrown: Throw) -> Meta {
        let (name, message, stack, cause) = match &thrown.0 {
            Value::Object(error) if error.is_error() => {
                let stack = error.get("stack").map(|s| s.display()).unwrap_or_default();
                let cause = match error.own_property("cause").map(|p| p.slot) {
                    Some(Slot::Data(cause)) => Some(cause),
                    _ => None,
                };
                (error.error_name(), thrown.message(), stack, cause)
            }
            other => ("Error".to_string(), other.display(), String::new(), None),
        };
        // A cause that cannot be encoded is dropped rather than masking the error.
        let cause = cause.and_then(|cause| ValueEncoder::new(self.scope).encode(&cause, false).ok());
        Meta::Exception(ExceptionMeta { name, message, stack, code: thrown.code(), cause: cause.map(Box::new) })
    }
}

fn member_get(target: Value, name: &str) -> Result<Register, Throw> {
    let value = target.get_member(name)?;
    Ok(Register { value, receiver: Some(target) })
}

fn member_construct(target: &Value, name: &str, args: &[Value]) -> Completion {
    let constructor = target.get_member(name)?;
    construct(&constructor, args)
}

/// Constructs through `constructor`, re-wrapping a throw from its body.
fn construct(constructor: &Value, args: &[Value]) -> Completion {
    match constructor {
        Value::Object(f) if f.is_constructor() => {
            f.construct(args).map_err(|thrown| wrap_call_error(f.function_name(), thrown))
        }
        other => Err(Throw::type_error(format!("{} is not a constructor", other.display()))),
    }
}

fn wrap_call_error(name: &str, thrown: Throw) -> Throw {
    let name = if name.is_empty() { "anonymous" } else { name };
    let error = ObjectRef::error(
        "Error",
        format!(
            "Could not call remote function '{}'. Check that the function signature is correct. Underlying error: {}",
            name,
            thrown.message()
        ),
    );
    if let Some(code) = thrown.code() {
        error.define("code", Property::data(code.into()));
    }
    error.define("cause", Property::data(thrown.0));
    Throw(error.into())
}
