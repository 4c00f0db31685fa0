//! Builtin functions the core exposes to the score language.
//!
//! Call targets resolve here before falling through to the host's external
//! dispatch. Output from `print`/`printf` goes to the interpreter's sink,
//! gated by the print-level setting; formatting errors are raised regardless
//! of the gate so a silenced score still fails loudly on a bad format.

use std::io::Write;
use std::rc::Rc;

use crate::error::MincError;
use crate::interp::Interpreter;
use crate::value::{MincValue, lerp_adjacent};

/// Dispatches a builtin by name. `None` means the name is not a builtin and
/// the caller should try the host's external table.
pub(crate) fn call_builtin_function(
    interp: &mut Interpreter,
    name: &str,
    args: &[MincValue],
) -> Option<Result<MincValue, MincError>> {
    let result = match name {
        "print" => print(interp, args),
        "printf" => printf(interp, args),
        "error" => score_error(interp, args),
        "len" => len(args),
        "interp" => interp_list(args),
        "index" => index(args),
        "contains" => contains(args),
        "type" => type_name(args),
        "tostring" => tostring(args),
        "substring" => substring(args),
        _ => return None,
    };
    Some(result)
}

fn want_args(name: &str, args: &[MincValue], count: usize) -> Result<(), MincError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(MincError::param(format!(
            "{name} takes {count} arguments, got {}",
            args.len()
        )))
    }
}

/// Writes `text` to the interpreter's sink when printing is enabled.
fn emit(interp: &mut Interpreter, text: &str) {
    if interp.settings.print_level > 0 {
        if let Err(err) = interp.output.write_all(text.as_bytes()) {
            tracing::debug!(%err, "print sink write failed");
        }
    }
}

/// `print(args...)`: type-specific formatting, lists truncated by the
/// print-list limit, newline-terminated.
fn print(interp: &mut Interpreter, args: &[MincValue]) -> Result<MincValue, MincError> {
    let limit = interp.settings.print_list_limit;
    let parts: Vec<String> = args.iter().map(|v| v.format(limit)).collect();
    emit(interp, &format!("{}\n", parts.join(" ")));
    Ok(MincValue::Void)
}

/// `error(args...)`: formats a message like `print` (strings unquoted) and
/// aborts the score pass with it.
fn score_error(interp: &mut Interpreter, args: &[MincValue]) -> Result<MincValue, MincError> {
    let limit = interp.settings.print_list_limit;
    let parts: Vec<String> = args
        .iter()
        .map(|v| match v {
            MincValue::String(s) => s.to_string(),
            other => other.format(limit),
        })
        .collect();
    Err(MincError::ScoreError(parts.join(" ")))
}

/// `printf(fmt, args...)` with specifiers `%d` `%f` `%l` `%s` `%t` `%z` and
/// escapes `\n` `\t` `\'` `\"`.
fn printf(interp: &mut Interpreter, args: &[MincValue]) -> Result<MincValue, MincError> {
    let Some(MincValue::String(fmt)) = args.first() else {
        return Err(MincError::Printf("format is not a string".into()));
    };
    let limit = interp.settings.print_list_limit;
    let mut out = String::new();
    let mut next_arg = 1;
    let mut chars = fmt.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '%' => {
                let spec = chars
                    .next()
                    .ok_or_else(|| MincError::Printf("format ends inside a specifier".into()))?;
                let arg = args.get(next_arg).ok_or_else(|| {
                    MincError::Printf(format!("too few arguments for format '{fmt}'"))
                })?;
                next_arg += 1;
                match (spec, arg) {
                    ('d', MincValue::Float(v)) => out.push_str(&format!("{}", v.trunc() as i64)),
                    ('d', other) => {
                        return Err(MincError::Printf(format!(
                            "%d expects a float, got {}",
                            other.minc_type()
                        )));
                    }
                    ('f', MincValue::Float(v)) => out.push_str(&format!("{v:.6}")),
                    ('f', other) => {
                        return Err(MincError::Printf(format!(
                            "%f expects a float, got {}",
                            other.minc_type()
                        )));
                    }
                    ('l', MincValue::List(_)) => out.push_str(&arg.format(limit)),
                    ('l', other) => {
                        return Err(MincError::Printf(format!(
                            "%l expects a list, got {}",
                            other.minc_type()
                        )));
                    }
                    ('s', MincValue::String(s)) => out.push_str(s),
                    ('s', other) => {
                        return Err(MincError::Printf(format!(
                            "%s expects a string, got {}",
                            other.minc_type()
                        )));
                    }
                    ('t', _) => out.push_str(&arg.minc_type().to_string()),
                    ('z', _) => out.push_str(&arg.format(limit)),
                    (unknown, _) => {
                        return Err(MincError::Printf(format!("unknown specifier '%{unknown}'")));
                    }
                }
            }
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            other => out.push(other),
        }
    }

    if next_arg < args.len() {
        tracing::debug!(
            unused = args.len() - next_arg,
            "printf: extra arguments ignored"
        );
    }
    emit(interp, &out);
    Ok(MincValue::Void)
}

/// `len(x)`: bytes for strings, element count for lists and maps, 1 for
/// floats and handles. Structs have no length.
fn len(args: &[MincValue]) -> Result<MincValue, MincError> {
    want_args("len", args, 1)?;
    let n = match &args[0] {
        MincValue::String(s) => s.len(),
        MincValue::List(items) => items.borrow().len(),
        MincValue::Map(map) => map.borrow().len(),
        MincValue::Float(_) | MincValue::Handle(_) => 1,
        other => {
            return Err(MincError::param(format!(
                "len: {} has no length",
                other.minc_type()
            )));
        }
    };
    Ok(MincValue::Float(n as f64))
}

/// `interp(list, frac)`: linear interpolation across a float list, with
/// `frac` clamped to [0, 1].
fn interp_list(args: &[MincValue]) -> Result<MincValue, MincError> {
    want_args("interp", args, 2)?;
    let (MincValue::List(items), MincValue::Float(frac)) = (&args[0], &args[1]) else {
        return Err(MincError::param("interp takes a list and a position"));
    };
    let items = items.borrow();
    let frac = frac.clamp(0.0, 1.0);
    let pos = frac * (items.len().saturating_sub(1)) as f64;
    match lerp_adjacent(&items, pos) {
        Some(v) => Ok(MincValue::Float(v)),
        None => {
            tracing::warn!("interp requires a nonempty list of floats");
            Ok(MincValue::Float(0.0))
        }
    }
}

/// `index(list, item)`: first position of `item`, or −1. Lists and handles
/// compare by identity, everything else by typed equality.
fn index(args: &[MincValue]) -> Result<MincValue, MincError> {
    want_args("index", args, 2)?;
    let MincValue::List(items) = &args[0] else {
        return Err(MincError::param("index searches a list"));
    };
    let found = items
        .borrow()
        .iter()
        .position(|item| item.identity_eq(&args[1]));
    Ok(MincValue::Float(found.map_or(-1.0, |i| i as f64)))
}

/// `contains(container, item)`: membership in a list, key presence in a
/// map, or substring search in a string. Yields 1.0 / 0.0.
fn contains(args: &[MincValue]) -> Result<MincValue, MincError> {
    want_args("contains", args, 2)?;
    let hit = match (&args[0], &args[1]) {
        (MincValue::List(items), item) => items.borrow().iter().any(|v| v.identity_eq(item)),
        (MincValue::Map(map), key) => map.borrow().contains_key(key),
        (MincValue::String(s), MincValue::String(needle)) => s.contains(&**needle),
        (MincValue::String(_), other) => {
            tracing::warn!(
                needle = %other.minc_type(),
                "contains on a string needs a string"
            );
            false
        }
        (other, _) => {
            return Err(MincError::param(format!(
                "contains: {} is not searchable",
                other.minc_type()
            )));
        }
    };
    Ok(MincValue::Float(if hit { 1.0 } else { 0.0 }))
}

/// `type(x)`: the value's type name.
fn type_name(args: &[MincValue]) -> Result<MincValue, MincError> {
    want_args("type", args, 1)?;
    Ok(MincValue::String(Rc::from(
        args[0].minc_type().to_string().as_str(),
    )))
}

/// `tostring(float)`: canonical text form; parses back to the same float.
fn tostring(args: &[MincValue]) -> Result<MincValue, MincError> {
    want_args("tostring", args, 1)?;
    let MincValue::Float(v) = &args[0] else {
        return Err(MincError::param("tostring takes a float"));
    };
    Ok(MincValue::String(Rc::from(format!("{v}").as_str())))
}

/// `substring(s, start, end)`: byte range `[start, end)`. Negative or
/// reversed ranges are errors; an end past the string clamps with a warning.
fn substring(args: &[MincValue]) -> Result<MincValue, MincError> {
    want_args("substring", args, 3)?;
    let (MincValue::String(s), MincValue::Float(start), MincValue::Float(end)) =
        (&args[0], &args[1], &args[2])
    else {
        return Err(MincError::param(
            "substring takes a string and two positions",
        ));
    };
    let (start, mut end) = (start.trunc(), end.trunc());
    if start < 0.0 || end < 0.0 {
        return Err(MincError::param("substring: negative range"));
    }
    if end < start {
        return Err(MincError::param("substring: reversed range"));
    }
    if end > s.len() as f64 {
        tracing::warn!(end, len = s.len(), "substring: end past string; clamping");
        end = s.len() as f64;
    }
    let (start, end) = (start as usize, end as usize);
    if start > s.len() {
        return Ok(MincValue::from(""));
    }
    let slice = String::from_utf8_lossy(&s.as_bytes()[start..end]).into_owned();
    Ok(MincValue::String(Rc::from(slice.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

    /// Print sink that captures into a shared buffer.
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capturing_interp() -> (Interpreter, Rc<RefCell<Vec<u8>>>) {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let mut interp = Interpreter::new();
        interp.set_output(Box::new(Capture(Rc::clone(&buffer))));
        (interp, buffer)
    }

    fn captured(buffer: &Rc<RefCell<Vec<u8>>>) -> String {
        String::from_utf8(buffer.borrow().clone()).unwrap()
    }

    fn float_list(items: &[f64]) -> MincValue {
        MincValue::new_list(items.iter().map(|&v| MincValue::Float(v)).collect())
    }

    fn run(interp: &mut Interpreter, name: &str, args: &[MincValue]) -> MincValue {
        call_builtin_function(interp, name, args)
            .expect("builtin name")
            .expect("builtin success")
    }

    #[test]
    fn test_unknown_name_falls_through() {
        let mut interp = Interpreter::new();
        assert!(call_builtin_function(&mut interp, "rtinput", &[]).is_none());
    }

    #[test]
    fn test_printf_specifiers() {
        let (mut interp, buffer) = capturing_interp();
        run(
            &mut interp,
            "printf",
            &[
                "%t %d %s\\n".into(),
                1.5.into(),
                2.9.into(),
                "hi".into(),
            ],
        );
        assert_eq!(captured(&buffer), "float 2 hi\n");
    }

    #[test]
    fn test_printf_list_specifier() {
        let (mut interp, buffer) = capturing_interp();
        let list = MincValue::new_list(vec![1.0.into(), "a".into()]);
        run(&mut interp, "printf", &["%l".into(), list]);
        assert_eq!(captured(&buffer), "[1, \"a\"]");
    }

    #[test]
    fn test_printf_too_few_args() {
        let mut interp = Interpreter::new();
        let err = call_builtin_function(&mut interp, "printf", &["%d %d".into(), 1.0.into()])
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, MincError::Printf(_)));
    }

    #[test]
    fn test_printf_unknown_specifier() {
        let mut interp = Interpreter::new();
        let err = call_builtin_function(&mut interp, "printf", &["%q".into(), 1.0.into()])
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, MincError::Printf(_)));
    }

    #[test]
    fn test_printf_errors_even_when_silenced() {
        let mut interp = Interpreter::new();
        interp.settings_mut().print_level = 0;
        let err = call_builtin_function(&mut interp, "printf", &[1.0.into()])
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, MincError::Printf(_)));
    }

    #[test]
    fn test_print_respects_gate() {
        let (mut interp, buffer) = capturing_interp();
        interp.settings_mut().print_level = 0;
        run(&mut interp, "print", &[1.0.into()]);
        assert_eq!(captured(&buffer), "");
    }

    #[test]
    fn test_len_semantics() {
        let mut interp = Interpreter::new();
        // Byte length, not code points.
        let v = run(&mut interp, "len", &["déjà".into()]);
        assert_eq!(v.try_eq(&6.0.into()), Some(true));
        let v = run(&mut interp, "len", &[float_list(&[1.0, 2.0])]);
        assert_eq!(v.try_eq(&2.0.into()), Some(true));
        let v = run(&mut interp, "len", &[3.14.into()]);
        assert_eq!(v.try_eq(&1.0.into()), Some(true));
    }

    #[test]
    fn test_interp_endpoints_and_midpoint() {
        let mut interp = Interpreter::new();
        let list = float_list(&[0.0, 10.0, 20.0]);
        let v = run(&mut interp, "interp", &[list.clone(), 0.0.into()]);
        assert_eq!(v.try_eq(&0.0.into()), Some(true));
        let v = run(&mut interp, "interp", &[list.clone(), 1.0.into()]);
        assert_eq!(v.try_eq(&20.0.into()), Some(true));
        let v = run(&mut interp, "interp", &[list.clone(), 0.25.into()]);
        assert_eq!(v.try_eq(&5.0.into()), Some(true));
        // Out-of-range position clamps.
        let v = run(&mut interp, "interp", &[list, 2.0.into()]);
        assert_eq!(v.try_eq(&20.0.into()), Some(true));
    }

    #[test]
    fn test_index_typed_and_identity() {
        let mut interp = Interpreter::new();
        let v = run(
            &mut interp,
            "index",
            &[float_list(&[5.0, 7.0, 7.0]), 7.0.into()],
        );
        assert_eq!(v.try_eq(&1.0.into()), Some(true));

        // Lists compare by identity, not content.
        let inner = float_list(&[1.0]);
        let twin = float_list(&[1.0]);
        let outer = MincValue::new_list(vec![twin, inner.clone()]);
        let v = run(&mut interp, "index", &[outer, inner]);
        assert_eq!(v.try_eq(&1.0.into()), Some(true));
    }

    #[test]
    fn test_index_miss_is_minus_one() {
        let mut interp = Interpreter::new();
        let v = run(&mut interp, "index", &[float_list(&[1.0]), "1".into()]);
        assert_eq!(v.try_eq(&(-1.0).into()), Some(true));
    }

    #[test]
    fn test_contains_variants() {
        let mut interp = Interpreter::new();
        let v = run(&mut interp, "contains", &[float_list(&[1.0, 2.0]), 2.0.into()]);
        assert_eq!(v.try_eq(&1.0.into()), Some(true));

        let map = MincValue::new_map();
        if let MincValue::Map(m) = &map {
            m.borrow_mut().insert("key".into(), 1.0.into());
        }
        let v = run(&mut interp, "contains", &[map, "key".into()]);
        assert_eq!(v.try_eq(&1.0.into()), Some(true));

        let v = run(&mut interp, "contains", &["hello".into(), "ell".into()]);
        assert_eq!(v.try_eq(&1.0.into()), Some(true));
        let v = run(&mut interp, "contains", &["hello".into(), "xyz".into()]);
        assert_eq!(v.try_eq(&0.0.into()), Some(true));
    }

    #[test]
    fn test_type_names() {
        let mut interp = Interpreter::new();
        let v = run(&mut interp, "type", &[1.0.into()]);
        assert_eq!(v.try_eq(&"float".into()), Some(true));
        let v = run(&mut interp, "type", &[MincValue::Void]);
        assert_eq!(v.try_eq(&"void".into()), Some(true));
    }

    #[test]
    fn test_tostring_roundtrip() {
        let mut interp = Interpreter::new();
        for x in [0.0, -1.5, 3.141592653589793, 1e300, 1.0 / 3.0] {
            let v = run(&mut interp, "tostring", &[x.into()]);
            let MincValue::String(s) = v else {
                panic!("tostring did not yield a string");
            };
            let parsed: f64 = s.parse().unwrap();
            assert_eq!(parsed, x);
        }
    }

    #[test]
    fn test_substring_ranges() {
        let mut interp = Interpreter::new();
        let v = run(&mut interp, "substring", &["tactus".into(), 1.0.into(), 4.0.into()]);
        assert_eq!(v.try_eq(&"act".into()), Some(true));

        // End past the string clamps.
        let v = run(&mut interp, "substring", &["abc".into(), 1.0.into(), 99.0.into()]);
        assert_eq!(v.try_eq(&"bc".into()), Some(true));

        let err = call_builtin_function(
            &mut interp,
            "substring",
            &["abc".into(), 2.0.into(), 1.0.into()],
        )
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, MincError::ParamError(_)));

        let err = call_builtin_function(
            &mut interp,
            "substring",
            &["abc".into(), (-1.0).into(), 2.0.into()],
        )
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, MincError::ParamError(_)));
    }

    #[test]
    fn test_error_builtin_aborts() {
        let mut interp = Interpreter::new();
        let err = call_builtin_function(&mut interp, "error", &["bad amp:".into(), 2.0.into()])
            .unwrap()
            .unwrap_err();
        assert_eq!(err.to_string(), "score error: bad amp: 2");
    }
}
