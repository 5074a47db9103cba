use crate::*;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

// ============================================================================
//  SCALARS
// ============================================================================

#[test]
fn test_scalars_in_sequence() -> Result<()> {
    let mut enc = Encoder::new();
    enc.bool(true)?;
    enc.u64(u64::MAX)?;
    enc.s64(i64::MIN)?;
    enc.f64(-0.5)?;
    enc.undefined()?;
    enc.null()?;
    enc.str("hide")?;
    enc.bytes(&[0, 255, 7])?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert!(dec.bool()?);
    assert_eq!(dec.u64()?, u64::MAX);
    assert_eq!(dec.s64()?, i64::MIN);
    assert_eq!(dec.f64()?, -0.5);
    dec.undefined()?;
    dec.null()?;
    assert_eq!(dec.str()?, "hide");
    assert_eq!(dec.bytes()?, &[0, 255, 7]);
    dec.finish()?;
    Ok(())
}

#[test]
fn test_nan_bits_survive() -> Result<()> {
    let weird = f64::from_bits(0x7ff8_0000_dead_beef);
    let mut enc = Encoder::new();
    enc.f64(weird)?;
    let bytes = enc.into_bytes()?;
    assert_eq!(Decoder::new(&bytes).f64()?.to_bits(), weird.to_bits());
    Ok(())
}

#[test]
fn test_wrong_tag_is_reported() -> Result<()> {
    let mut enc = Encoder::new();
    enc.str("7")?;
    let bytes = enc.into_bytes()?;

    let err = Decoder::new(&bytes).u64().unwrap_err();
    assert_eq!(err, Error::UnexpectedTag { expected: Tag::U64, found: Tag::String });
    Ok(())
}

// ============================================================================
//  CONTAINERS
// ============================================================================

#[test]
fn test_map_of_variants() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    enc.entry("id", |e| e.u64(3))?;
    enc.entry("name", |e| e.str("hide"))?;
    enc.map_end()?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    let mut map = dec.map()?;
    let (k, mut v) = map.next()?.unwrap();
    assert_eq!(k, "id");
    assert_eq!(v.u64()?, 3);
    let (k, mut v) = map.next()?.unwrap();
    assert_eq!(k, "name");
    assert_eq!(v.str()?, "hide");
    assert!(map.next()?.is_none());
    Ok(())
}

#[test]
fn test_nested_lists_and_skip() -> Result<()> {
    let mut enc = Encoder::new();
    enc.list_begin()?;
    enc.list_begin()?;
    enc.u64(1)?;
    enc.list_end()?;
    enc.str("after")?;
    enc.list_end()?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    let mut items = dec.list()?;
    let mut first = items.next()?.unwrap();
    first.skip()?;
    first.finish()?;
    assert_eq!(items.next()?.unwrap().str()?, "after");
    assert!(items.next()?.is_none());
    Ok(())
}

#[test]
fn test_option_some_and_none() -> Result<()> {
    let mut enc = Encoder::new();
    enc.option_some_begin()?;
    enc.str("cause")?;
    enc.option_some_end()?;
    enc.option_none()?;
    let bytes = enc.into_bytes()?;

    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.option()?.unwrap().str()?, "cause");
    assert!(dec.option()?.is_none());
    Ok(())
}

// ============================================================================
//  STRUCTURAL STRICTNESS
// ============================================================================

#[test]
fn test_map_rejects_bare_scalars() {
    let mut enc = Encoder::new();
    enc.map_begin().unwrap();
    assert_eq!(enc.u64(1), Err(Error::InvalidMapEntry));
}

#[test]
fn test_variant_holds_exactly_one_payload() {
    let mut enc = Encoder::new();
    enc.variant_begin("value").unwrap();
    assert_eq!(enc.variant_end(), Err(Error::EmptyAdt(Scope::Variant)));
    enc.null().unwrap();
    assert_eq!(enc.null(), Err(Error::TooManyItems(Scope::Variant)));
    enc.variant_end().unwrap();
    assert!(enc.into_bytes().is_ok());
}

#[test]
fn test_scope_errors() {
    let mut enc = Encoder::new();
    assert_eq!(enc.list_end(), Err(Error::ScopeUnderflow));

    enc.list_begin().unwrap();
    assert_eq!(
        enc.map_end(),
        Err(Error::ScopeMismatch { expected: Scope::Map, actual: Scope::List })
    );
    assert!(matches!(enc.into_bytes(), Err(Error::ScopeStillOpen)));
}

// ============================================================================
//  ROBUSTNESS
// ============================================================================

#[test]
fn test_truncated_input_never_panics() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    enc.entry("members", |e| {
        e.list_begin()?;
        e.str("minimize")?;
        e.bytes(&[1, 2, 3, 4])?;
        e.list_end()
    })?;
    enc.map_end()?;
    let bytes = enc.into_bytes()?;

    for cut in 0..bytes.len() {
        let mut dec = Decoder::new(&bytes[..cut]);
        assert!(dec.skip().is_err(), "cut at {cut} should not decode");
    }
    Ok(())
}

#[test]
fn test_garbage_input_never_panics() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..2_000 {
        let len = rng.gen_range(0..64);
        let bytes: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
        let mut dec = Decoder::new(&bytes);
        while dec.remaining() > 0 {
            if dec.skip().is_err() {
                break;
            }
        }
        let mut dec = Decoder::new(&bytes);
        if let Ok(mut map) = dec.map() {
            while let Ok(Some(_)) = map.next() {}
        }
    }
}
