use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unknown string value for one of the wire enums below.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid value for {field}: {value}")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form is also the serde form, so the wire and the DB agree.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn all() -> &'static [$name] {
                &[$(Self::$variant),+]
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(
    /// The three record kinds the assistant may act on.
    EntityKind {
        Appointment => "appointment",
        Medication => "medication",
        HealthLog => "health_log",
    }
);

str_enum!(
    /// What the assistant wants done to a record.
    Intent {
        Create => "create",
        Update => "update",
        Delete => "delete",
    }
);

str_enum!(ChatRole {
    User => "user",
    Model => "model",
});

impl EntityKind {
    /// Descriptive field used to match a loose reference to a stored record.
    pub fn label_field(&self) -> &'static str {
        match self {
            Self::Appointment => "appointment_name",
            Self::Medication => "medication_name",
            Self::HealthLog => "symptom_type",
        }
    }

    /// Canonical date/time field of the record.
    pub fn date_field(&self) -> &'static str {
        match self {
            Self::Appointment => "date",
            Self::Medication => "reminder_time",
            Self::HealthLog => "start_date",
        }
    }

    /// Human-facing name used in notifications.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Appointment => "appointment",
            Self::Medication => "medication reminder",
            Self::HealthLog => "health log",
        }
    }
}
