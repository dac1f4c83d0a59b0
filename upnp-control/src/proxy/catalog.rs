//! Actions and state variables declared by a service description.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Argument direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// UPnP data types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Ui1,
    Ui2,
    Ui4,
    Ui8,
    I1,
    I2,
    I4,
    I8,
    Int,
    R4,
    R8,
    Number,
    Fixed14_4,
    Float,
    Char,
    String,
    Boolean,
    BinBase64,
    BinHex,
    Date,
    DateTime,
    DateTimeTz,
    Time,
    TimeTz,
    Uri,
    Uuid,
    /// Vendor or unknown type; values are not checked
    Other(std::string::String),
}

impl DataType {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "ui1" => Self::Ui1,
            "ui2" => Self::Ui2,
            "ui4" => Self::Ui4,
            "ui8" => Self::Ui8,
            "i1" => Self::I1,
            "i2" => Self::I2,
            "i4" => Self::I4,
            "i8" => Self::I8,
            "int" => Self::Int,
            "r4" => Self::R4,
            "r8" => Self::R8,
            "number" => Self::Number,
            "fixed.14.4" => Self::Fixed14_4,
            "float" => Self::Float,
            "char" => Self::Char,
            "string" => Self::String,
            "boolean" => Self::Boolean,
            "bin.base64" => Self::BinBase64,
            "bin.hex" => Self::BinHex,
            "date" => Self::Date,
            "dateTime" => Self::DateTime,
            "dateTime.tz" => Self::DateTimeTz,
            "time" => Self::Time,
            "time.tz" => Self::TimeTz,
            "uri" => Self::Uri,
            "uuid" => Self::Uuid,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Ui1
                | Self::Ui2
                | Self::Ui4
                | Self::Ui8
                | Self::I1
                | Self::I2
                | Self::I4
                | Self::I8
                | Self::Int
                | Self::R4
                | Self::R8
                | Self::Number
                | Self::Fixed14_4
                | Self::Float
        )
    }

    /// Check that `value` is a lexically valid instance of this type.
    ///
    /// Only the types whose violations a device would certainly reject are
    /// checked; date, time, URI and binary values pass through.
    pub fn check(&self, value: &str) -> Result<(), std::string::String> {
        let v = value.trim();
        let ok = match self {
            Self::Ui1 => v.parse::<u8>().is_ok(),
            Self::Ui2 => v.parse::<u16>().is_ok(),
            Self::Ui4 => v.parse::<u32>().is_ok(),
            Self::Ui8 => v.parse::<u64>().is_ok(),
            Self::I1 => v.parse::<i8>().is_ok(),
            Self::I2 => v.parse::<i16>().is_ok(),
            Self::I4 | Self::Int => v.parse::<i32>().is_ok(),
            Self::I8 => v.parse::<i64>().is_ok(),
            Self::R4 | Self::R8 | Self::Number | Self::Fixed14_4 | Self::Float => {
                v.parse::<f64>().map(f64::is_finite).unwrap_or(false)
            }
            Self::Char => value.chars().count() == 1,
            Self::Boolean => matches!(
                v.to_ascii_lowercase().as_str(),
                "0" | "1" | "true" | "false" | "yes" | "no"
            ),
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{:?} is not a valid {:?}", value, self))
        }
    }
}

/// Numeric bounds of an allowed-value range, parsed from the description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub minimum: f64,
    pub maximum: f64,
    pub step: Option<f64>,
}

impl NumericRange {
    pub fn contains(&self, value: f64) -> bool {
        if value < self.minimum || value > self.maximum {
            return false;
        }
        match self.step {
            Some(step) if step > 0.0 => {
                let steps = (value - self.minimum) / step;
                (steps - steps.round()).abs() < 1e-9
            }
            _ => true,
        }
    }
}

/// Allowed-value range as declared; bounds are parsed on first use and the
/// result is kept for the lifetime of the state variable.
#[derive(Debug)]
pub struct AllowedRange {
    pub minimum: String,
    pub maximum: String,
    pub step: Option<String>,
    parsed: OnceLock<Option<NumericRange>>,
}

impl AllowedRange {
    pub fn new(minimum: impl Into<String>, maximum: impl Into<String>, step: Option<String>) -> Self {
        Self {
            minimum: minimum.into(),
            maximum: maximum.into(),
            step,
            parsed: OnceLock::new(),
        }
    }

    /// Parsed bounds, or `None` when the declaration is not numeric
    pub fn bounds(&self) -> Option<NumericRange> {
        *self.parsed.get_or_init(|| {
            let minimum = self.minimum.trim().parse::<f64>().ok()?;
            let maximum = self.maximum.trim().parse::<f64>().ok()?;
            let step = match &self.step {
                Some(s) => Some(s.trim().parse::<f64>().ok()?),
                None => None,
            };
            Some(NumericRange { minimum, maximum, step })
        })
    }

    #[cfg(test)]
    fn is_parsed(&self) -> bool {
        self.parsed.get().is_some()
    }
}

/// At most one constraint applies to a state variable.
#[derive(Debug)]
pub enum Constraint {
    AllowedValues(Vec<String>),
    AllowedRange(AllowedRange),
}

/// A declared state variable
#[derive(Debug)]
pub struct StateVariable {
    pub name: String,
    pub data_type: DataType,
    pub default_value: Option<String>,
    pub send_events: bool,
    pub constraint: Option<Constraint>,
}

impl StateVariable {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            default_value: None,
            send_events: false,
            constraint: None,
        }
    }

    /// Check a value against the data type and constraint.
    pub fn validate(&self, value: &str) -> Result<(), String> {
        self.data_type.check(value)?;

        match &self.constraint {
            None => Ok(()),
            Some(Constraint::AllowedValues(values)) => {
                if values.iter().any(|allowed| allowed == value) {
                    Ok(())
                } else {
                    Err(format!("{:?} is not one of {:?}", value, values))
                }
            }
            Some(Constraint::AllowedRange(range)) => {
                let Some(bounds) = range.bounds() else {
                    // An unparseable range cannot be enforced
                    return Ok(());
                };
                let number = value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("{:?} is not numeric", value))?;
                if bounds.contains(number) {
                    Ok(())
                } else {
                    Err(format!(
                        "{} is outside {}..={}",
                        value, range.minimum, range.maximum
                    ))
                }
            }
        }
    }
}

/// An action argument
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    pub direction: Direction,
    pub is_return_value: bool,
    /// Name of the related state variable as declared
    pub related_state_variable_name: String,
    /// Resolved related state variable; `None` when the declaration names
    /// a variable the state table does not contain
    pub related_state_variable: Option<Arc<StateVariable>>,
}

/// A declared action
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub arguments: Vec<Argument>,
}

impl Action {
    pub fn in_arguments(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.direction == Direction::In)
    }

    pub fn out_arguments(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.direction == Direction::Out)
    }

    /// The single out-argument flagged as return value, if any
    pub fn return_value(&self) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.is_return_value)
    }

    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }
}

/// Actions and state variables of one service type.
///
/// Immutable once built.
#[derive(Debug, Default)]
pub struct ServiceCatalog {
    actions: Vec<Action>,
    action_index: HashMap<String, usize>,
    state_variables: Vec<Arc<StateVariable>>,
    variable_index: HashMap<String, usize>,
    /// Entries skipped while parsing, one message each
    pub warnings: Vec<String>,
}

impl ServiceCatalog {
    pub fn new(
        actions: Vec<Action>,
        state_variables: Vec<Arc<StateVariable>>,
        warnings: Vec<String>,
    ) -> Self {
        let action_index = actions
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i))
            .collect();
        let variable_index = state_variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.clone(), i))
            .collect();
        Self {
            actions,
            action_index,
            state_variables,
            variable_index,
            warnings,
        }
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.action_index.get(name).map(|&i| &self.actions[i])
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn state_variable(&self, name: &str) -> Option<&Arc<StateVariable>> {
        self.variable_index.get(name).map(|&i| &self.state_variables[i])
    }

    pub fn state_variables(&self) -> &[Arc<StateVariable>] {
        &self.state_variables
    }

    /// Whether the service declares `name`
    pub fn implements(&self, name: &str) -> bool {
        self.action_index.contains_key(name)
    }
}
