//! # Codec
//!
//! Translation between descriptors/commands and the `metapack` wire format.
//!
//! ## Layout
//!
//! Every descriptor and every command is a `Variant(tag, payload)` where the
//! tag is the name from the data model (`value`, `object`, `member_call`, ...).
//! Compound payloads are maps; unknown map keys are skipped on decode.
//!
//! ## Invariants
//! - **Recursion Safety**: all recursive operations are bounded by `MAX_DEPTH`.
//! - **Panic Safety**: decoding returns `Result` on every malformed input.

use metapack::Decoder;
use metapack::Encoder;
use metapack::Tag;

use crate::command::Command;
use crate::error::Error;
use crate::error::Result;
use crate::meta::ArgMeta;
use crate::meta::ExceptionMeta;
use crate::meta::HandleId;
use crate::meta::MemberDescriptor;
use crate::meta::MemberKind;
use crate::meta::Meta;
use crate::meta::ObjectMeta;
use crate::meta::Plain;
use crate::meta::Prototype;

/// The maximum nesting depth of a descriptor before decoding gives up.
pub const MAX_DEPTH: usize = 64;

fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::RecursionLimitExceeded);
    }
    Ok(())
}

fn missing(what: &str, field: &str) -> Error {
    Error::ProtocolViolation(format!("{} is missing '{}'", what, field))
}

/// Writes `key => body` as one map entry.
fn field(enc: &mut Encoder, key: &str, body: impl FnOnce(&mut Encoder) -> Result<()>) -> Result<()> {
    enc.variant_begin(key)?;
    body(enc)?;
    enc.variant_end()?;
    Ok(())
}

fn encode_option<T: ?Sized>(
    enc: &mut Encoder,
    value: Option<&T>,
    body: impl FnOnce(&mut Encoder, &T) -> Result<()>,
) -> Result<()> {
    match value {
        Some(v) => {
            enc.option_some_begin()?;
            body(enc, v)?;
            enc.option_some_end()?;
        }
        None => enc.option_none()?,
    }
    Ok(())
}

// ============================================================================
//  PLAIN DATA
// ============================================================================

pub fn encode_plain(enc: &mut Encoder, plain: &Plain) -> Result<()> {
    encode_plain_impl(enc, plain, 0)
}

fn encode_plain_impl(enc: &mut Encoder, plain: &Plain, depth: usize) -> Result<()> {
    check_depth(depth)?;
    match plain {
        Plain::Undefined => enc.undefined()?,
        Plain::Null => enc.null()?,
        Plain::Bool(b) => enc.bool(*b)?,
        Plain::Number(n) => enc.f64(*n)?,
        Plain::String(s) => enc.str(s)?,
        Plain::List(items) => {
            enc.list_begin()?;
            for item in items {
                encode_plain_impl(enc, item, depth + 1)?;
            }
            enc.list_end()?;
        }
        Plain::Record(fields) => {
            enc.map_begin()?;
            for (name, value) in fields {
                field(enc, name, |e| encode_plain_impl(e, value, depth + 1))?;
            }
            enc.map_end()?;
        }
    }
    Ok(())
}

pub fn decode_plain(dec: &mut Decoder) -> Result<Plain> {
    decode_plain_impl(dec, 0)
}

fn decode_plain_impl(dec: &mut Decoder, depth: usize) -> Result<Plain> {
    check_depth(depth)?;
    let plain = match dec.peek_tag()? {
        Tag::Undefined => { dec.undefined()?; Plain::Undefined }
        Tag::Null => { dec.null()?; Plain::Null }
        Tag::BoolTrue | Tag::BoolFalse => Plain::Bool(dec.bool()?),
        Tag::F64 => Plain::Number(dec.f64()?),
        // Integers are accepted from foreign encoders and widened.
        Tag::U64 => Plain::Number(dec.u64()? as f64),
        Tag::S64 => Plain::Number(dec.s64()? as f64),
        Tag::String => Plain::String(dec.str()?.to_string()),
        Tag::List => {
            let mut iter = dec.list()?;
            let mut items = Vec::new();
            while let Some(mut item) = iter.next()? {
                items.push(decode_plain_impl(&mut item, depth + 1)?);
            }
            Plain::List(items)
        }
        Tag::Map => {
            let mut iter = dec.map()?;
            let mut fields = Vec::new();
            while let Some((name, mut value)) = iter.next()? {
                fields.push((name.to_string(), decode_plain_impl(&mut value, depth + 1)?));
            }
            Plain::Record(fields)
        }
        other => return Err(Error::ProtocolViolation(format!("{:?} is not plain data", other))),
    };
    Ok(plain)
}

// ============================================================================
//  MEMBERS AND PROTOTYPES
// ============================================================================

fn encode_member(enc: &mut Encoder, member: &MemberDescriptor) -> Result<()> {
    enc.map_begin()?;
    enc.entry("name", |e| e.str(&member.name))?;
    enc.entry("enumerable", |e| e.bool(member.enumerable))?;
    enc.entry("writable", |e| e.bool(member.writable))?;
    enc.entry("kind", |e| e.str(member.kind.as_tag()))?;
    enc.map_end()?;
    Ok(())
}

fn decode_member(dec: &mut Decoder) -> Result<MemberDescriptor> {
    let mut map = dec.map()?;
    let mut name = None;
    let mut enumerable = false;
    let mut writable = false;
    let mut kind = None;

    while let Some((key, mut val)) = map.next()? {
        match key {
            "name" => name = Some(val.str()?.to_string()),
            "enumerable" => enumerable = val.bool()?,
            "writable" => writable = val.bool()?,
            "kind" => {
                let tag = val.str()?;
                kind = Some(MemberKind::from_tag(tag).ok_or_else(|| Error::UnknownVariant(tag.to_string()))?);
            }
            _ => val.skip()?,
        }
    }

    Ok(MemberDescriptor {
        name: name.ok_or_else(|| missing("member", "name"))?,
        enumerable,
        writable,
        kind: kind.ok_or_else(|| missing("member", "kind"))?,
    })
}

fn encode_members(enc: &mut Encoder, members: &[MemberDescriptor]) -> Result<()> {
    enc.list_begin()?;
    for member in members {
        encode_member(enc, member)?;
    }
    enc.list_end()?;
    Ok(())
}

fn decode_members(dec: &mut Decoder) -> Result<Vec<MemberDescriptor>> {
    let mut iter = dec.list()?;
    let mut members = Vec::new();
    while let Some(mut item) = iter.next()? {
        members.push(decode_member(&mut item)?);
    }
    Ok(members)
}

fn encode_proto(enc: &mut Encoder, proto: Option<&Prototype>, depth: usize) -> Result<()> {
    check_depth(depth)?;
    encode_option(enc, proto, |enc, proto| {
        enc.map_begin()?;
        field(enc, "members", |e| encode_members(e, &proto.members))?;
        field(enc, "proto", |e| encode_proto(e, proto.proto.as_deref(), depth + 1))?;
        enc.map_end()?;
        Ok(())
    })
}

fn decode_proto(dec: &mut Decoder, depth: usize) -> Result<Option<Box<Prototype>>> {
    check_depth(depth)?;
    let Some(mut inner) = dec.option()? else { return Ok(None) };
    let mut map = inner.map()?;
    let mut members = Vec::new();
    let mut proto = None;

    while let Some((key, mut val)) = map.next()? {
        match key {
            "members" => members = decode_members(&mut val)?,
            "proto" => proto = decode_proto(&mut val, depth + 1)?,
            _ => val.skip()?,
        }
    }

    Ok(Some(Box::new(Prototype { members, proto })))
}

fn encode_object(enc: &mut Encoder, object: &ObjectMeta) -> Result<()> {
    enc.map_begin()?;
    enc.entry("id", |e| e.u64(object.id.0))?;
    enc.entry("name", |e| e.str(&object.name))?;
    field(enc, "members", |e| encode_members(e, &object.members))?;
    field(enc, "proto", |e| encode_proto(e, object.proto.as_deref(), 0))?;
    enc.map_end()?;
    Ok(())
}

fn decode_object(dec: &mut Decoder, what: &str) -> Result<ObjectMeta> {
    let mut map = dec.map()?;
    let mut id = None;
    let mut name = String::new();
    let mut members = Vec::new();
    let mut proto = None;

    while let Some((key, mut val)) = map.next()? {
        match key {
            "id" => id = Some(HandleId(val.u64()?)),
            "name" => name = val.str()?.to_string(),
            "members" => members = decode_members(&mut val)?,
            "proto" => proto = decode_proto(&mut val, 0)?,
            _ => val.skip()?,
        }
    }

    Ok(ObjectMeta { id: id.ok_or_else(|| missing(what, "id"))?, name, members, proto })
}

// ============================================================================
//  META (server to client)
// ============================================================================

pub fn encode_meta(enc: &mut Encoder, meta: &Meta) -> Result<()> {
    encode_meta_impl(enc, meta, 0)
}

fn encode_meta_impl(enc: &mut Encoder, meta: &Meta, depth: usize) -> Result<()> {
    check_depth(depth)?;
    enc.variant_begin(meta.tag())?;
    match meta {
        Meta::Value(plain) => encode_plain_impl(enc, plain, depth + 1)?,
        Meta::Array(items) => {
            enc.list_begin()?;
            for item in items {
                encode_meta_impl(enc, item, depth + 1)?;
            }
            enc.list_end()?;
        }
        Meta::Object(object) | Meta::Function(object) => encode_object(enc, object)?,
        Meta::Buffer(bytes) => enc.bytes(bytes)?,
        Meta::Date(ms) => enc.f64(*ms)?,
        Meta::Promise { then } => encode_meta_impl(enc, then, depth + 1)?,
        Meta::Error { members } => {
            enc.map_begin()?;
            for (name, value) in members {
                field(enc, name, |e| encode_meta_impl(e, value, depth + 1))?;
            }
            enc.map_end()?;
        }
        Meta::Exception(exception) => {
            enc.map_begin()?;
            enc.entry("name", |e| e.str(&exception.name))?;
            enc.entry("message", |e| e.str(&exception.message))?;
            enc.entry("stack", |e| e.str(&exception.stack))?;
            field(enc, "code", |e| encode_option(e, exception.code.as_deref(), |e, code| Ok(e.str(code)?)))?;
            field(enc, "cause", |e| {
                encode_option(e, exception.cause.as_deref(), |e, cause| encode_meta_impl(e, cause, depth + 1))
            })?;
            enc.map_end()?;
        }
    }
    enc.variant_end()?;
    Ok(())
}

pub fn decode_meta(dec: &mut Decoder) -> Result<Meta> {
    decode_meta_impl(dec, 0)
}

fn decode_meta_impl(dec: &mut Decoder, depth: usize) -> Result<Meta> {
    check_depth(depth)?;
    let (tag, mut body) = dec.variant()?;
    let meta = match tag {
        "value" => Meta::Value(decode_plain_impl(&mut body, depth + 1)?),
        "array" => {
            let mut iter = body.list()?;
            let mut items = Vec::new();
            while let Some(mut item) = iter.next()? {
                items.push(decode_meta_impl(&mut item, depth + 1)?);
            }
            Meta::Array(items)
        }
        "object" => Meta::Object(decode_object(&mut body, tag)?),
        "function" => Meta::Function(decode_object(&mut body, tag)?),
        "buffer" => Meta::Buffer(body.bytes()?.to_vec()),
        "date" => Meta::Date(body.f64()?),
        "promise" => Meta::Promise { then: Box::new(decode_meta_impl(&mut body, depth + 1)?) },
        "error" => {
            let mut map = body.map()?;
            let mut members = Vec::new();
            while let Some((name, mut value)) = map.next()? {
                members.push((name.to_string(), decode_meta_impl(&mut value, depth + 1)?));
            }
            Meta::Error { members }
        }
        "exception" => Meta::Exception(decode_exception(&mut body, depth)?),
        _ => return Err(Error::UnknownVariant(format!("meta: {}", tag))),
    };
    Ok(meta)
}

fn decode_exception(dec: &mut Decoder, depth: usize) -> Result<ExceptionMeta> {
    let mut map = dec.map()?;
    let mut exception = ExceptionMeta {
        name: "Error".to_string(),
        message: String::new(),
        stack: String::new(),
        code: None,
        cause: None,
    };

    while let Some((key, mut val)) = map.next()? {
        match key {
            "name" => exception.name = val.str()?.to_string(),
            "message" => exception.message = val.str()?.to_string(),
            "stack" => exception.stack = val.str()?.to_string(),
            "code" => {
                if let Some(mut code) = val.option()? {
                    exception.code = Some(code.str()?.to_string());
                }
            }
            "cause" => {
                if let Some(mut cause) = val.option()? {
                    exception.cause = Some(Box::new(decode_meta_impl(&mut cause, depth + 1)?));
                }
            }
            _ => val.skip()?,
        }
    }

    Ok(exception)
}

// ============================================================================
//  ARG META (client to server)
// ============================================================================

pub fn encode_arg(enc: &mut Encoder, arg: &ArgMeta) -> Result<()> {
    encode_arg_impl(enc, arg, 0)
}

fn encode_arg_impl(enc: &mut Encoder, arg: &ArgMeta, depth: usize) -> Result<()> {
    check_depth(depth)?;
    enc.variant_begin(arg.tag())?;
    match arg {
        ArgMeta::Value(plain) => encode_plain_impl(enc, plain, depth + 1)?,
        ArgMeta::Array(items) => encode_args_impl(enc, items, depth + 1)?,
        ArgMeta::Buffer(bytes) => enc.bytes(bytes)?,
        ArgMeta::Date(ms) => enc.f64(*ms)?,
        ArgMeta::Promise { then } => encode_arg_impl(enc, then, depth + 1)?,
        ArgMeta::Object { name, members } => {
            enc.map_begin()?;
            enc.entry("name", |e| e.str(name))?;
            field(enc, "members", |e| {
                e.map_begin()?;
                for (member, value) in members {
                    field(e, member, |e| encode_arg_impl(e, value, depth + 1))?;
                }
                e.map_end()?;
                Ok(())
            })?;
            enc.map_end()?;
        }
        ArgMeta::RemoteObject(id) => enc.u64(id.0)?,
        ArgMeta::FunctionWithReturnValue(value) => encode_arg_impl(enc, value, depth + 1)?,
        ArgMeta::Function { name } => {
            enc.map_begin()?;
            enc.entry("name", |e| e.str(name))?;
            enc.map_end()?;
        }
    }
    enc.variant_end()?;
    Ok(())
}

/// Encodes an argument list.
pub fn encode_args(enc: &mut Encoder, args: &[ArgMeta]) -> Result<()> {
    encode_args_impl(enc, args, 0)
}

fn encode_args_impl(enc: &mut Encoder, args: &[ArgMeta], depth: usize) -> Result<()> {
    enc.list_begin()?;
    for arg in args {
        encode_arg_impl(enc, arg, depth)?;
    }
    enc.list_end()?;
    Ok(())
}

pub fn decode_arg(dec: &mut Decoder) -> Result<ArgMeta> {
    decode_arg_impl(dec, 0)
}

fn decode_arg_impl(dec: &mut Decoder, depth: usize) -> Result<ArgMeta> {
    check_depth(depth)?;
    let (tag, mut body) = dec.variant()?;
    let arg = match tag {
        "value" => ArgMeta::Value(decode_plain_impl(&mut body, depth + 1)?),
        "array" => ArgMeta::Array(decode_args_impl(&mut body, depth + 1)?),
        "buffer" => ArgMeta::Buffer(body.bytes()?.to_vec()),
        "date" => ArgMeta::Date(body.f64()?),
        "promise" => ArgMeta::Promise { then: Box::new(decode_arg_impl(&mut body, depth + 1)?) },
        "object" => {
            let mut map = body.map()?;
            let mut name = String::new();
            let mut members = Vec::new();
            while let Some((key, mut val)) = map.next()? {
                match key {
                    "name" => name = val.str()?.to_string(),
                    "members" => {
                        let mut entries = val.map()?;
                        while let Some((member, mut value)) = entries.next()? {
                            members.push((member.to_string(), decode_arg_impl(&mut value, depth + 1)?));
                        }
                    }
                    _ => val.skip()?,
                }
            }
            ArgMeta::Object { name, members }
        }
        "remote-object" => ArgMeta::RemoteObject(HandleId(body.u64()?)),
        "function-with-return-value" => {
            ArgMeta::FunctionWithReturnValue(Box::new(decode_arg_impl(&mut body, depth + 1)?))
        }
        "function" => {
            let mut map = body.map()?;
            let mut name = String::new();
            while let Some((key, mut val)) = map.next()? {
                match key {
                    "name" => name = val.str()?.to_string(),
                    _ => val.skip()?,
                }
            }
            ArgMeta::Function { name }
        }
        _ => return Err(Error::UnknownVariant(format!("argument: {}", tag))),
    };
    Ok(arg)
}

/// Decodes an argument list.
pub fn decode_args(dec: &mut Decoder) -> Result<Vec<ArgMeta>> {
    decode_args_impl(dec, 0)
}

fn decode_args_impl(dec: &mut Decoder, depth: usize) -> Result<Vec<ArgMeta>> {
    let mut iter = dec.list()?;
    let mut args = Vec::new();
    while let Some(mut item) = iter.next()? {
        args.push(decode_arg_impl(&mut item, depth)?);
    }
    Ok(args)
}

// ============================================================================
//  COMMANDS
// ============================================================================

pub fn encode_command(enc: &mut Encoder, command: &Command) -> Result<()> {
    enc.variant_begin(command.tag())?;
    enc.map_begin()?;
    match command {
        Command::MemberGet { name }
        | Command::GetBuiltin { name }
        | Command::GetGlobal { name }
        | Command::Require { name } => {
            enc.entry("name", |e| e.str(name))?;
        }
        Command::MemberSet { name, value } => {
            enc.entry("name", |e| e.str(name))?;
            field(enc, "value", |e| encode_arg(e, value))?;
        }
        Command::MemberCall { name, args } | Command::MemberConstruct { name, args } => {
            enc.entry("name", |e| e.str(name))?;
            field(enc, "args", |e| encode_args(e, args))?;
        }
        Command::RemoteObjectGet { id, name } => {
            enc.entry("id", |e| e.u64(id.0))?;
            enc.entry("name", |e| e.str(name))?;
        }
        Command::RemoteObjectSet { id, name, value } => {
            enc.entry("id", |e| e.u64(id.0))?;
            enc.entry("name", |e| e.str(name))?;
            field(enc, "value", |e| encode_arg(e, value))?;
        }
        Command::RemoteObjectCall { id, name, args } | Command::RemoteObjectConstruct { id, name, args } => {
            enc.entry("id", |e| e.u64(id.0))?;
            enc.entry("name", |e| e.str(name))?;
            field(enc, "args", |e| encode_args(e, args))?;
        }
        Command::FunctionCall { id, args } | Command::ConstructorCall { id, args } => {
            if let Some(id) = id {
                enc.entry("id", |e| e.u64(id.0))?;
            }
            field(enc, "args", |e| encode_args(e, args))?;
        }
        Command::GetCurrentWindow | Command::GetCurrentWebContents => {}
    }
    enc.map_end()?;
    enc.variant_end()?;
    Ok(())
}

/// The fields any command payload may carry.
#[derive(Default)]
struct CommandFields {
    id: Option<HandleId>,
    name: Option<String>,
    value: Option<ArgMeta>,
    args: Option<Vec<ArgMeta>>,
}

impl CommandFields {
    fn decode(dec: &mut Decoder) -> Result<Self> {
        let mut fields = Self::default();
        let mut map = dec.map()?;
        while let Some((key, mut val)) = map.next()? {
            match key {
                "id" => fields.id = Some(HandleId(val.u64()?)),
                "name" => fields.name = Some(val.str()?.to_string()),
                "value" => fields.value = Some(decode_arg(&mut val)?),
                "args" => fields.args = Some(decode_args(&mut val)?),
                _ => val.skip()?,
            }
        }
        Ok(fields)
    }

    fn id(&mut self, tag: &str) -> Result<HandleId> {
        self.id.take().ok_or_else(|| missing(tag, "id"))
    }

    fn name(&mut self, tag: &str) -> Result<String> {
        self.name.take().ok_or_else(|| missing(tag, "name"))
    }

    fn value(&mut self, tag: &str) -> Result<ArgMeta> {
        self.value.take().ok_or_else(|| missing(tag, "value"))
    }

    /// An absent argument list means no arguments.
    fn args(&mut self) -> Vec<ArgMeta> {
        self.args.take().unwrap_or_default()
    }
}

pub fn decode_command(dec: &mut Decoder) -> Result<Command> {
    let (tag, mut body) = dec.variant()?;
    let mut f = CommandFields::decode(&mut body)?;
    let command = match tag {
        "member_get" => Command::MemberGet { name: f.name(tag)? },
        "member_set" => Command::MemberSet { name: f.name(tag)?, value: f.value(tag)? },
        "member_call" => Command::MemberCall { name: f.name(tag)?, args: f.args() },
        "member_construct" => Command::MemberConstruct { name: f.name(tag)?, args: f.args() },
        "remote_object_get" => Command::RemoteObjectGet { id: f.id(tag)?, name: f.name(tag)? },
        "remote_object_set" => Command::RemoteObjectSet { id: f.id(tag)?, name: f.name(tag)?, value: f.value(tag)? },
        "remote_object_call" => Command::RemoteObjectCall { id: f.id(tag)?, name: f.name(tag)?, args: f.args() },
        "remote_object_construct" => {
            Command::RemoteObjectConstruct { id: f.id(tag)?, name: f.name(tag)?, args: f.args() }
        }
        "function_call" => Command::FunctionCall { id: f.id.take(), args: f.args() },
        "constructor_call" => Command::ConstructorCall { id: f.id.take(), args: f.args() },
        "get_builtin" => Command::GetBuiltin { name: f.name(tag)? },
        "get_global" => Command::GetGlobal { name: f.name(tag)? },
        "get_current_window" => Command::GetCurrentWindow,
        "get_current_web_contents" => Command::GetCurrentWebContents,
        "require" => Command::Require { name: f.name(tag)? },
        _ => return Err(Error::UnknownVariant(format!("command: {}", tag))),
    };
    Ok(command)
}
