//! `concat`, `sprintf`, `matches`

use regex_lite::Regex;

use crate::error::{FactbaseError, Result};
use crate::term::Term;
use crate::value::Value;

use super::{arity, arity_between, Outcome, Scope};

pub(super) fn concat(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    let mut out = String::new();
    for o in term.operands() {
        for v in scope.values(o)?.unwrap_or_default() {
            out.push_str(&v.plain());
        }
    }
    Ok(Outcome::value(Value::Str(out)))
}

pub(super) fn sprintf(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity_between(term, 1, usize::MAX)?;
    let oo = term.operands();
    let Some(Value::Str(pattern)) = scope.scalar(&oo[0])? else {
        return Err(FactbaseError::Type(
            "a format string expected as the first operand".to_string(),
        ));
    };
    let args = oo[1..]
        .iter()
        .map(|o| scope.values(o).map(|vv| vv.and_then(|vv| vv.into_iter().next())))
        .collect::<Result<Vec<_>>>()?;
    format(&pattern, &args).map(|s| Outcome::value(Value::Str(s)))
}

/// printf-style formatting: `%s %d %f %.Nf %x %%`.
fn format(pattern: &str, args: &[Option<Value>]) -> Result<String> {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = pattern.chars().peekable();
    let missing = || FactbaseError::Type(format!("not enough arguments for '{}'", pattern));
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(*d);
                chars.next();
            }
            precision = Some(digits.parse::<usize>().map_err(|_| {
                FactbaseError::Type(format!("bad precision in '{}'", pattern))
            })?);
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                let arg = args.next().ok_or_else(missing)?;
                out.push_str(&arg.as_ref().map(Value::plain).unwrap_or_default());
            }
            Some('d') => match args.next().ok_or_else(missing)? {
                Some(Value::Int(i)) => out.push_str(&i.to_string()),
                Some(Value::Float(f)) => out.push_str(&format!("{}", f.trunc() as i64)),
                other => return Err(wrong("%d", other)),
            },
            Some('x') => match args.next().ok_or_else(missing)? {
                Some(Value::Int(i)) => out.push_str(&format!("{:x}", i)),
                other => return Err(wrong("%x", other)),
            },
            Some('f') => match args.next().ok_or_else(missing)? {
                Some(v @ (Value::Int(_) | Value::Float(_))) => {
                    let f = v.as_f64().unwrap_or_default();
                    out.push_str(&format!("{:.*}", precision.unwrap_or(6), f));
                }
                other => return Err(wrong("%f", other)),
            },
            other => {
                return Err(FactbaseError::Type(format!(
                    "unsupported directive '%{}' in '{}'",
                    other.map(String::from).unwrap_or_default(),
                    pattern
                )))
            }
        }
    }
    Ok(out)
}

fn wrong(directive: &str, arg: &Option<Value>) -> FactbaseError {
    let got = arg.as_ref().map_or("nil".to_string(), |v| v.to_string());
    FactbaseError::Type(format!("{} can't format {}", directive, got))
}

/// True if any value, as text, matches the pattern.
pub(super) fn matches(term: &Term, scope: &Scope<'_>) -> Result<Outcome> {
    arity(term, 2)?;
    let Some(Value::Str(pattern)) = scope.scalar(&term.operands()[1])? else {
        return Err(FactbaseError::Type(
            "a regular expression string expected as the second operand".to_string(),
        ));
    };
    let Some(values) = scope.values(&term.operands()[0])? else {
        return Ok(Outcome::Bool(false));
    };
    let mut regexes = scope.run().regexes.borrow_mut();
    if !regexes.contains_key(&pattern) {
        let re = Regex::new(&pattern)
            .map_err(|e| FactbaseError::Type(format!("bad regular expression: {}", e)))?;
        regexes.insert(pattern.clone(), re);
    }
    let re = &regexes[&pattern];
    Ok(Outcome::Bool(values.iter().any(|v| re.is_match(&v.plain()))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_directives() {
        let args = vec![
            Some(Value::from("x")),
            Some(Value::Int(42)),
            Some(Value::Float(1.23456)),
            Some(Value::Int(255)),
        ];
        assert_eq!(
            format("%s-%d-%.2f-%x-100%%", &args).unwrap(),
            "x-42-1.23-ff-100%"
        );
        assert_eq!(format("%f", &[Some(Value::Int(2))]).unwrap(), "2.000000");
    }

    #[test]
    fn test_format_nil_and_errors() {
        assert_eq!(format("[%s]", &[None]).unwrap(), "[]");
        assert!(format("%d", &[Some(Value::from("a"))]).is_err());
        assert!(format("%s %s", &[Some(Value::Int(1))]).is_err());
        assert!(format("%q", &[]).is_err());
    }
}
