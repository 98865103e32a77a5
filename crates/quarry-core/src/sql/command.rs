//! Parameterized command templates.

use std::fmt::Write;

use quarry_expr::{ParameterValue, Value};

use crate::config::Flavor;
use crate::error::{Error, Result};

/// A piece of command text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// A placeholder for the scalar parameter in `slot`.
    Param(usize),
    /// `item IN (..)` over the list parameter in `slot`, one placeholder per
    /// element. An empty list renders as the false predicate `1 = 0`.
    InList { item: Vec<Segment>, slot: usize },
}

/// Command text with parameter holes, rendered once per compiled plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    flavor: Flavor,
    segments: Vec<Segment>,
}

/// A command ready to send to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub text: String,
    /// Values for the placeholders, in placeholder order.
    pub parameters: Vec<Value>,
}

impl CommandTemplate {
    pub fn new(flavor: Flavor, segments: Vec<Segment>) -> Self {
        Self { flavor, segments }
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parameter slots referenced by the template.
    pub fn slots(&self) -> Vec<usize> {
        fn walk(segments: &[Segment], out: &mut Vec<usize>) {
            for segment in segments {
                match segment {
                    Segment::Text(_) => {}
                    Segment::Param(slot) => out.push(*slot),
                    Segment::InList { item, slot } => {
                        walk(item, out);
                        out.push(*slot);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.segments, &mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    /// The text with `:pN` markers in place of placeholders.
    pub fn display_text(&self) -> String {
        fn walk(segments: &[Segment], out: &mut String) {
            for segment in segments {
                match segment {
                    Segment::Text(text) => out.push_str(text),
                    Segment::Param(slot) => {
                        let _ = write!(out, ":p{slot}");
                    }
                    Segment::InList { item, slot } => {
                        walk(item, out);
                        let _ = write!(out, " IN (:p{slot}...)");
                    }
                }
            }
        }
        let mut out = String::new();
        walk(&self.segments, &mut out);
        out
    }

    /// Bind parameter values, producing the concrete command.
    pub fn bind(&self, parameters: &[ParameterValue]) -> Result<Command> {
        let mut binder = Binder {
            flavor: self.flavor,
            parameters,
            command: Command {
                text: String::new(),
                parameters: Vec::new(),
            },
        };
        binder.write(&self.segments)?;
        Ok(binder.command)
    }
}

struct Binder<'a> {
    flavor: Flavor,
    parameters: &'a [ParameterValue],
    command: Command,
}

impl<'a> Binder<'a> {
    fn write(&mut self, segments: &[Segment]) -> Result<()> {
        for segment in segments {
            match segment {
                Segment::Text(text) => self.command.text.push_str(text),
                Segment::Param(slot) => match self.lookup(*slot)? {
                    ParameterValue::Scalar(value) => self.placeholder(value.clone()),
                    ParameterValue::List(_) => {
                        return Err(Error::InvalidData(format!(
                            "parameter {slot} is a list where a scalar is expected"
                        )))
                    }
                },
                Segment::InList { item, slot } => {
                    let values = match self.lookup(*slot)? {
                        ParameterValue::List(values) => values,
                        ParameterValue::Scalar(_) => {
                            return Err(Error::InvalidData(format!(
                                "parameter {slot} is a scalar where a list is expected"
                            )))
                        }
                    };
                    if values.is_empty() {
                        self.command.text.push_str("1 = 0");
                        continue;
                    }
                    self.command.text.push('(');
                    self.write(item)?;
                    self.command.text.push_str(" IN (");
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            self.command.text.push_str(", ");
                        }
                        self.placeholder(value.clone());
                    }
                    self.command.text.push_str("))");
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, slot: usize) -> Result<&'a ParameterValue> {
        self.parameters
            .get(slot)
            .ok_or_else(|| Error::Compile(format!("no value bound for parameter slot {slot}")))
    }

    fn placeholder(&mut self, value: Value) {
        self.command.parameters.push(value);
        let n = self.command.parameters.len();
        let text = &mut self.command.text;
        let _ = match self.flavor {
            Flavor::Mysql => write!(text, "?"),
            Flavor::Postgresql => write!(text, "${n}"),
            Flavor::Sqlite => write!(text, "?{n}"),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(flavor: Flavor) -> CommandTemplate {
        CommandTemplate::new(
            flavor,
            vec![
                Segment::Text("SELECT 1 WHERE a = ".into()),
                Segment::Param(0),
                Segment::Text(" AND ".into()),
                Segment::InList {
                    item: vec![Segment::Text("b".into())],
                    slot: 1,
                },
                Segment::Text(" AND c = ".into()),
                Segment::Param(0),
            ],
        )
    }

    fn params(list: Vec<Value>) -> Vec<ParameterValue> {
        vec![
            ParameterValue::Scalar(Value::Int32(7)),
            ParameterValue::List(list),
        ]
    }

    #[test]
    fn test_placeholders_per_flavor() {
        let list = vec![Value::Int32(1), Value::Int32(2)];
        let sqlite = template(Flavor::Sqlite).bind(&params(list.clone())).unwrap();
        assert_eq!(
            sqlite.text,
            "SELECT 1 WHERE a = ?1 AND (b IN (?2, ?3)) AND c = ?4"
        );
        assert_eq!(
            sqlite.parameters,
            vec![Value::Int32(7), Value::Int32(1), Value::Int32(2), Value::Int32(7)]
        );

        let pg = template(Flavor::Postgresql).bind(&params(list.clone())).unwrap();
        assert_eq!(pg.text, "SELECT 1 WHERE a = $1 AND (b IN ($2, $3)) AND c = $4");

        let mysql = template(Flavor::Mysql).bind(&params(list)).unwrap();
        assert_eq!(mysql.text, "SELECT 1 WHERE a = ? AND (b IN (?, ?)) AND c = ?");
    }

    #[test]
    fn test_empty_list_is_false() {
        let command = template(Flavor::Sqlite).bind(&params(vec![])).unwrap();
        assert_eq!(command.text, "SELECT 1 WHERE a = ?1 AND 1 = 0 AND c = ?2");
        assert_eq!(command.parameters.len(), 2);
    }

    #[test]
    fn test_missing_and_mismatched_values() {
        let t = template(Flavor::Sqlite);
        assert!(matches!(t.bind(&[]), Err(Error::Compile(_))));
        let swapped = vec![
            ParameterValue::List(vec![]),
            ParameterValue::Scalar(Value::Int32(1)),
        ];
        assert!(matches!(t.bind(&swapped), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_slots_and_display() {
        let t = template(Flavor::Sqlite);
        assert_eq!(t.slots(), vec![0, 1]);
        assert_eq!(
            t.display_text(),
            "SELECT 1 WHERE a = :p0 AND b IN (:p1...) AND c = :p0"
        );
    }
}
