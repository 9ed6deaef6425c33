//! Streaming JSON text writer.
//!
//! Compact by default; pretty mode indents nested containers by two spaces
//! and puts one member per line.

use rust_decimal::Decimal;

#[derive(Debug, Default)]
pub struct JsonWriter {
    out: String,
    pretty: bool,
    /// One entry per open container: has it received a member yet?
    open: Vec<bool>,
    after_key: bool,
}

impl JsonWriter {
    pub fn new(pretty: bool) -> Self {
        JsonWriter {
            pretty,
            ..Default::default()
        }
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn indent(&mut self, level: usize) {
        for _ in 0..level {
            self.out.push_str("  ");
        }
    }

    // Separator and indentation before a value or key.
    fn before_item(&mut self) {
        if self.after_key {
            self.after_key = false;
            return;
        }
        let level = self.open.len();
        if let Some(has_members) = self.open.last_mut() {
            if *has_members {
                self.out.push(',');
            }
            *has_members = true;
            if self.pretty {
                self.out.push('\n');
                self.indent(level);
            }
        }
    }

    fn close(&mut self, bracket: char) {
        let had_members = self.open.pop().unwrap_or(false);
        if self.pretty && had_members {
            self.out.push('\n');
            let level = self.open.len();
            self.indent(level);
        }
        self.out.push(bracket);
    }

    pub fn begin_object(&mut self) {
        self.before_item();
        self.out.push('{');
        self.open.push(false);
    }

    pub fn end_object(&mut self) {
        self.close('}');
    }

    pub fn begin_array(&mut self) {
        self.before_item();
        self.out.push('[');
        self.open.push(false);
    }

    pub fn end_array(&mut self) {
        self.close(']');
    }

    pub fn key(&mut self, key: &str) {
        self.before_item();
        self.push_quoted(key);
        self.out.push(':');
        if self.pretty {
            self.out.push(' ');
        }
        self.after_key = true;
    }

    pub fn null(&mut self) {
        self.before_item();
        self.out.push_str("null");
    }

    pub fn boolean(&mut self, b: bool) {
        self.before_item();
        self.out.push_str(if b { "true" } else { "false" });
    }

    pub fn integer(&mut self, n: i64) {
        self.before_item();
        self.out.push_str(&n.to_string());
    }

    /// Non-finite floats have no JSON form and are written as `null`.
    pub fn float(&mut self, n: f64) {
        self.before_item();
        if n.is_finite() {
            self.out.push_str(&n.to_string());
        } else {
            self.out.push_str("null");
        }
    }

    pub fn decimal(&mut self, d: Decimal) {
        self.before_item();
        self.out.push_str(&d.normalize().to_string());
    }

    pub fn string(&mut self, s: &str) {
        self.before_item();
        self.push_quoted(s);
    }

    /// `{}` as a single token, used for removed dictionary keys.
    pub fn empty_object(&mut self) {
        self.begin_object();
        self.end_object();
    }

    fn push_quoted(&mut self, s: &str) {
        self.out.push('"');
        for c in s.chars() {
            match c {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                c if c.is_control() => {
                    // Unicode escape for control chars
                    self.out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }
}

#[test]
fn test_compact_and_pretty_layout() {
    let mut writer = JsonWriter::new(false);
    writer.begin_object();
    writer.key("a");
    writer.integer(1);
    writer.key("b");
    writer.begin_array();
    writer.string("x\"y");
    writer.null();
    writer.end_array();
    writer.key("c");
    writer.empty_object();
    writer.end_object();
    assert_eq!(writer.finish(), r#"{"a":1,"b":["x\"y",null],"c":{}}"#);

    let mut writer = JsonWriter::new(true);
    writer.begin_object();
    writer.key("a");
    writer.begin_array();
    writer.integer(1);
    writer.end_array();
    writer.end_object();
    assert_eq!(writer.finish(), "{\n  \"a\": [\n    1\n  ]\n}");
}
