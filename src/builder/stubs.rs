//! Extern signature parsing and mock binding generation.
//!
//! Every registered extern becomes three C definitions in a generated
//! translation unit linked into the shared library:
//!
//! - a static function-pointer slot,
//! - an exported registrar `ctdd_attach_<name>(void *)` that fills the slot,
//! - a definition of `<name>` itself that forwards to the slot.
//!
//! The code under test calls `<name>` as usual and lands in whatever the test
//! attached; the test can call the same exported `<name>` to exercise the
//! binding from the other side.

use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{HarnessError, Result};

/// Prefix of the exported registrar for each extern.
pub const ATTACH_PREFIX: &str = "ctdd_attach_";

/// Type words that can never be a parameter name.
const TYPE_WORDS: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "_Bool",
    "bool", "const", "volatile", "restrict",
];

const QUALIFIERS: &[&str] = &["const", "volatile", "restrict"];

const TAG_KEYWORDS: &[&str] = &["struct", "union", "enum"];

fn declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:extern\s+)?(?P<ret>[A-Za-z_][\w\s\*]*?)\s*(?P<name>[A-Za-z_]\w*)\s*\((?P<params>[^()]*)\)\s*;?$",
        )
        .expect("extern declaration regex is valid")
    })
}

/// A parsed extern declaration, e.g. `int read_sensor(int channel);`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternSignature {
    /// The declaration as registered
    pub declaration: String,
    /// Symbol name
    pub name: String,
    /// Return type, `void` for none
    pub return_type: String,
    /// Parameter types with names stripped
    pub params: Vec<String>,
}

impl ExternSignature {
    /// Parse a C function declaration.
    pub fn parse(declaration: &str) -> Result<Self> {
        let invalid = |reason: &str| HarnessError::Signature {
            signature: declaration.to_string(),
            reason: reason.to_string(),
        };

        let normalized = declaration.split_whitespace().collect::<Vec<_>>().join(" ");
        let caps = declaration_regex()
            .captures(&normalized)
            .ok_or_else(|| invalid("expected `<return type> <name>(<params>)`"))?;

        let return_type = tidy_type(&caps["ret"]);
        if return_type.is_empty() {
            return Err(invalid("missing return type"));
        }

        let raw_params = caps["params"].trim();
        let mut params = Vec::new();
        if !raw_params.is_empty() && raw_params != "void" {
            for param in raw_params.split(',') {
                let param = param.trim();
                if param == "..." {
                    return Err(invalid("variadic externs cannot be mocked"));
                }
                if param.contains('[') {
                    return Err(invalid("array parameters must be written as pointers"));
                }
                if param.is_empty() {
                    return Err(invalid("empty parameter"));
                }
                params.push(param_type(param));
            }
        }

        Ok(ExternSignature {
            declaration: declaration.trim().to_string(),
            name: caps["name"].to_string(),
            return_type,
            params,
        })
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether the extern returns nothing.
    pub fn returns_void(&self) -> bool {
        self.return_type == "void"
    }

    /// Name of the exported registrar for this extern.
    pub fn attach_symbol(&self) -> String {
        attach_symbol(&self.name)
    }

    fn slot(&self) -> String {
        format!("ctdd_slot_{}", self.name)
    }

    fn param_list(&self, named: bool) -> String {
        if self.params.is_empty() {
            return "void".to_string();
        }
        self.params
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                if named {
                    format!("{} a{}", ty, i)
                } else {
                    ty.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Name of the exported registrar for an extern symbol.
pub fn attach_symbol(name: &str) -> String {
    format!("{}{}", ATTACH_PREFIX, name)
}

/// Parse a list of declarations, rejecting duplicate symbol names.
pub fn parse_all(declarations: &[String]) -> Result<Vec<ExternSignature>> {
    let mut parsed: Vec<ExternSignature> = Vec::with_capacity(declarations.len());
    for declaration in declarations {
        let sig = ExternSignature::parse(declaration)?;
        if parsed.iter().any(|p| p.name == sig.name) {
            return Err(HarnessError::Signature {
                signature: declaration.clone(),
                reason: format!("`{}` is registered twice", sig.name),
            });
        }
        parsed.push(sig);
    }
    Ok(parsed)
}

/// Generate the C translation unit holding slots, registrars and forwarders.
pub fn generate_stubs(unit: &str, headers: &[String], externs: &[ExternSignature]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "/* Generated by ctdd for unit `{}`. Do not edit. */", unit);
    out.push_str("#include <stdio.h>\n#include <stdlib.h>\n");
    for header in headers {
        let _ = writeln!(out, "#include \"{}\"", header);
    }
    out.push_str(
        r#"
static void ctdd_unattached(const char *name)
{
    fprintf(stderr, "ctdd: extern `%s` called before a mock was attached\n", name);
    abort();
}
"#,
    );

    for sig in externs {
        let slot = sig.slot();
        let slot_ty = format!("{}_t", slot);
        let args = (0..sig.arity())
            .map(|i| format!("a{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let ret = if sig.returns_void() { "" } else { "return " };

        let _ = write!(
            out,
            r#"
/* {decl} */
typedef {rty} (*{slot_ty})({unnamed});
static {slot_ty} {slot};

void {attach}(void *fn)
{{
    {slot} = ({slot_ty})fn;
}}

{rty} {name}({named})
{{
    if (!{slot}) ctdd_unattached("{name}");
    {ret}{slot}({args});
}}
"#,
            decl = sig.declaration,
            rty = sig.return_type,
            slot_ty = slot_ty,
            slot = slot,
            unnamed = sig.param_list(false),
            named = sig.param_list(true),
            attach = sig.attach_symbol(),
            name = sig.name,
            ret = ret,
            args = args,
        );
    }

    out
}

/// Strip a parameter name, keeping the type: `const char *msg` -> `const char *`.
fn param_type(param: &str) -> String {
    let spaced = param.replace('*', " * ");
    let mut tokens: Vec<&str> = spaced.split_whitespace().collect();

    if tokens.len() > 1 {
        let last = tokens[tokens.len() - 1];
        let before = tokens[tokens.len() - 2];
        let rest_has_type = tokens[..tokens.len() - 1]
            .iter()
            .any(|t| !QUALIFIERS.contains(t));
        if last != "*"
            && !TYPE_WORDS.contains(&last)
            && !TAG_KEYWORDS.contains(&before)
            && rest_has_type
        {
            tokens.pop();
        }
    }

    tidy_type(&tokens.join(" "))
}

/// Normalize spacing around pointer stars: `char * *` -> `char **`.
fn tidy_type(ty: &str) -> String {
    let spaced = ty.replace('*', " * ");
    let mut out = String::new();
    for token in spaced.split_whitespace() {
        if token == "*" {
            if !out.ends_with('*') {
                out.push(' ');
            }
            out.push('*');
        } else {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(token);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_params() {
        let sig = ExternSignature::parse("int read_sensor(int channel, const char *label);").unwrap();
        assert_eq!(sig.name, "read_sensor");
        assert_eq!(sig.return_type, "int");
        assert_eq!(sig.params, vec!["int", "const char *"]);
        assert_eq!(sig.arity(), 2);
    }

    #[test]
    fn test_parse_unnamed_and_void() {
        let sig = ExternSignature::parse("extern void tick(void)").unwrap();
        assert!(sig.returns_void());
        assert_eq!(sig.arity(), 0);

        let sig = ExternSignature::parse("unsigned long checksum(unsigned char*, size_t)").unwrap();
        assert_eq!(sig.return_type, "unsigned long");
        assert_eq!(sig.params, vec!["unsigned char *", "size_t"]);

        let sig = ExternSignature::parse("int empty()").unwrap();
        assert_eq!(sig.arity(), 0);
    }

    #[test]
    fn test_parse_pointer_return_and_tags() {
        let sig = ExternSignature::parse("char **split(struct line l, struct token)").unwrap();
        assert_eq!(sig.return_type, "char **");
        assert_eq!(sig.name, "split");
        assert_eq!(sig.params, vec!["struct line", "struct token"]);

        let sig = ExternSignature::parse("void store(const sensor_t)").unwrap();
        assert_eq!(sig.params, vec!["const sensor_t"]);
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        assert!(ExternSignature::parse("int printf(const char *fmt, ...)").is_err());
        assert!(ExternSignature::parse("int sum(int values[4])").is_err());
        assert!(ExternSignature::parse("void on(void (*cb)(int))").is_err());
        assert!(ExternSignature::parse("not a declaration").is_err());
    }

    #[test]
    fn test_parse_all_rejects_duplicates() {
        let decls = vec!["int f(int)".to_string(), "int f(long)".to_string()];
        let err = parse_all(&decls).unwrap_err();
        assert!(err.to_string().contains("registered twice"));
    }

    #[test]
    fn test_generate_stubs() {
        let externs = parse_all(&[
            "int read_sensor(int channel)".to_string(),
            "void log_event(const char *msg)".to_string(),
        ])
        .unwrap();
        let code = generate_stubs("sensor_test", &["sensor_test.h".to_string()], &externs);

        assert!(code.contains("#include \"sensor_test.h\""));
        assert!(code.contains("typedef int (*ctdd_slot_read_sensor_t)(int);"));
        assert!(code.contains("void ctdd_attach_read_sensor(void *fn)"));
        assert!(code.contains("int read_sensor(int a0)"));
        assert!(code.contains("return ctdd_slot_read_sensor(a0);"));
        assert!(code.contains("void log_event(const char * a0)"));
        assert!(code.contains("    ctdd_slot_log_event(a0);"));
        assert!(!code.contains("return ctdd_slot_log_event"));
    }

    #[test]
    fn test_generate_preserves_registration_order() {
        let externs = parse_all(&["int b(void)".to_string(), "int a(void)".to_string()]).unwrap();
        let code = generate_stubs("order", &[], &externs);
        let b = code.find("ctdd_attach_b").unwrap();
        let a = code.find("ctdd_attach_a").unwrap();
        assert!(b < a);
    }
}
