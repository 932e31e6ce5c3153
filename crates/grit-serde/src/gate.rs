//! Version gating.
//!
//! Every attribute or node introduced (or retired) at some schema version is
//! read and written through these combinators, so the version policy of each
//! field is stated once at its call site:
//!
//! ```ignore
//! ctx.run_from_minimum_version(SchemaVersion::V1_3, |ctx| write_aliases(data, ctx))?;
//! ctx.write_double_attribute_from_minimum_version(GENERATOR, "ratedS", g.rated_s, f64::NAN, SchemaVersion::V1_5)?;
//! ```
//!
//! On write, a feature the target version cannot carry is either a hard
//! [`GritError::VersionIncompatibility`] or a logged warning with the feature
//! left out, depending on [`IncompatibilityBehavior`]. On read, a feature
//! newer than the document is always an error.

use std::fmt;

use grit_core::{GritError, GritResult};
use tracing::warn;

use crate::context::{DeserializerContext, SerializerContext};
use crate::options::IncompatibilityBehavior;
use crate::tree::same_double;
use crate::version::SchemaVersion;

/// Why a feature cannot be carried by a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMessage {
    NotSupported,
    NotNullNotSupported,
    NotDefaultNotSupported,
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorMessage::NotSupported => "not supported",
            ErrorMessage::NotNullNotSupported => "not null and not supported",
            ErrorMessage::NotDefaultNotSupported => "not defined as default and not supported",
        })
    }
}

pub fn minimum_version_error(
    root: &str,
    element: &str,
    message: ErrorMessage,
    minimum: SchemaVersion,
    actual: SchemaVersion,
) -> GritError {
    GritError::VersionIncompatibility(format!(
        "{}.{} is {} for schema version {}. Schema version should be >= {}",
        root, element, message, actual, minimum
    ))
}

pub fn maximum_version_error(
    root: &str,
    element: &str,
    message: ErrorMessage,
    maximum: SchemaVersion,
    actual: SchemaVersion,
) -> GritError {
    GritError::VersionIncompatibility(format!(
        "{}.{} is {} for schema version {}. Schema version should be <= {}",
        root, element, message, actual, maximum
    ))
}

/// Conditional execution on the version of a context.
pub trait VersionGate {
    fn version(&self) -> SchemaVersion;

    /// Runs `action` when the version is at least `minimum`.
    fn run_from_minimum_version<F>(&mut self, minimum: SchemaVersion, action: F) -> GritResult<()>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> GritResult<()>,
    {
        if self.version() >= minimum {
            action(self)?;
        }
        Ok(())
    }

    /// Runs `action` when the version is at most `maximum`.
    fn run_until_maximum_version<F>(&mut self, maximum: SchemaVersion, action: F) -> GritResult<()>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> GritResult<()>,
    {
        if self.version() <= maximum {
            action(self)?;
        }
        Ok(())
    }

    /// Value of `action` when the version is at least `minimum`, `None` otherwise.
    fn from_minimum_version<T, F>(&mut self, minimum: SchemaVersion, action: F) -> GritResult<Option<T>>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> GritResult<T>,
    {
        if self.version() >= minimum {
            action(self).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl VersionGate for SerializerContext<'_> {
    fn version(&self) -> SchemaVersion {
        self.version
    }
}

impl VersionGate for DeserializerContext<'_> {
    fn version(&self) -> SchemaVersion {
        self.version
    }
}

impl SerializerContext<'_> {
    /// Applies the incompatibility policy. `Ok(false)` means the feature is
    /// left out of the document.
    fn incompatible(&mut self, error: GritError) -> GritResult<bool> {
        match self.options().version_incompatibility_behavior {
            IncompatibilityBehavior::ThrowException => Err(error),
            IncompatibilityBehavior::LogError => {
                let message = error.to_string();
                warn!("{}", message);
                self.diagnostics.add_warning("version", &message);
                Ok(false)
            }
        }
    }

    /// `Ok(true)` when the target version carries the feature.
    pub fn check_minimum_version(
        &mut self,
        root: &str,
        element: &str,
        message: ErrorMessage,
        minimum: SchemaVersion,
    ) -> GritResult<bool> {
        if self.version >= minimum {
            return Ok(true);
        }
        let error = minimum_version_error(root, element, message, minimum, self.version);
        self.incompatible(error)
    }

    pub fn check_maximum_version(
        &mut self,
        root: &str,
        element: &str,
        message: ErrorMessage,
        maximum: SchemaVersion,
    ) -> GritResult<bool> {
        if self.version <= maximum {
            return Ok(true);
        }
        let error = maximum_version_error(root, element, message, maximum, self.version);
        self.incompatible(error)
    }

    /// Fails unconditionally below `minimum`, whatever the policy. For
    /// features the document cannot stay consistent without.
    pub fn assert_minimum_version(
        &self,
        root: &str,
        element: &str,
        message: ErrorMessage,
        minimum: SchemaVersion,
    ) -> GritResult<()> {
        if self.version < minimum {
            return Err(minimum_version_error(root, element, message, minimum, self.version));
        }
        Ok(())
    }

    /// Not-default-or-unsupported double: omitted when equal to `default`,
    /// gated otherwise.
    pub fn write_double_attribute_from_minimum_version(
        &mut self,
        root: &str,
        name: &str,
        value: f64,
        default: f64,
        minimum: SchemaVersion,
    ) -> GritResult<()> {
        if same_double(value, default)
            || !self.check_minimum_version(root, name, ErrorMessage::NotDefaultNotSupported, minimum)?
        {
            return Ok(());
        }
        self.writer().write_double_attribute(name, value)
    }

    pub fn write_boolean_attribute_from_minimum_version(
        &mut self,
        root: &str,
        name: &str,
        value: bool,
        default: bool,
        minimum: SchemaVersion,
    ) -> GritResult<()> {
        if value == default
            || !self.check_minimum_version(root, name, ErrorMessage::NotDefaultNotSupported, minimum)?
        {
            return Ok(());
        }
        self.writer().write_boolean_attribute(name, value)
    }

    /// Not-null-or-unsupported string: omitted when `None`, gated otherwise.
    pub fn write_string_attribute_from_minimum_version(
        &mut self,
        root: &str,
        name: &str,
        value: Option<&str>,
        minimum: SchemaVersion,
    ) -> GritResult<()> {
        let Some(value) = value else {
            return Ok(());
        };
        if !self.check_minimum_version(root, name, ErrorMessage::NotNullNotSupported, minimum)? {
            return Ok(());
        }
        self.writer().write_string_attribute(name, Some(value))
    }
}

impl DeserializerContext<'_> {
    /// Fails when the document is older than `minimum`.
    pub fn assert_minimum_version(
        &self,
        root: &str,
        element: &str,
        message: ErrorMessage,
        minimum: SchemaVersion,
    ) -> GritResult<()> {
        if self.version < minimum {
            return Err(minimum_version_error(root, element, message, minimum, self.version));
        }
        Ok(())
    }

    pub fn assert_maximum_version(
        &self,
        root: &str,
        element: &str,
        message: ErrorMessage,
        maximum: SchemaVersion,
    ) -> GritResult<()> {
        if self.version > maximum {
            return Err(maximum_version_error(root, element, message, maximum, self.version));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymizer::IdentityAnonymizer;
    use crate::extensions::ExtensionPlan;
    use crate::options::ExportOptions;
    use crate::tree::json::JsonWriter;
    use crate::tree::ArrayNames;

    fn context(options: &ExportOptions) -> SerializerContext<'_> {
        let writer = JsonWriter::new(Vec::new(), false, ArrayNames::new());
        SerializerContext::new(
            Box::new(writer),
            Box::new(IdentityAnonymizer),
            options,
            String::new(),
            ExtensionPlan::default(),
        )
    }

    #[test]
    fn test_error_message_format() {
        let err = minimum_version_error(
            "generator",
            "ratedS",
            ErrorMessage::NotDefaultNotSupported,
            SchemaVersion::V1_5,
            SchemaVersion::V1_1,
        );
        assert_eq!(
            err.to_string(),
            "Version incompatibility: generator.ratedS is not defined as default and not \
             supported for schema version 1.1. Schema version should be >= 1.5"
        );
    }

    #[test]
    fn test_run_combinators() {
        let options = ExportOptions::default().with_version(SchemaVersion::V1_4);
        let mut ctx = context(&options);
        let mut ran = Vec::new();
        ctx.run_from_minimum_version(SchemaVersion::V1_3, |_| {
            ran.push("from-1.3");
            Ok(())
        })
        .unwrap();
        ctx.run_from_minimum_version(SchemaVersion::V1_5, |_| {
            ran.push("from-1.5");
            Ok(())
        })
        .unwrap();
        ctx.run_until_maximum_version(SchemaVersion::V1_4, |_| {
            ran.push("until-1.4");
            Ok(())
        })
        .unwrap();
        assert_eq!(ran, vec!["from-1.3", "until-1.4"]);
        assert_eq!(
            ctx.from_minimum_version(SchemaVersion::V1_10, |_| Ok(1)).unwrap(),
            None
        );
    }

    #[test]
    fn test_policy_throw() {
        let options = ExportOptions::default().with_version(SchemaVersion::V1_1);
        let mut ctx = context(&options);
        let err = ctx
            .check_minimum_version("generator", "ratedS", ErrorMessage::NotDefaultNotSupported, SchemaVersion::V1_5)
            .unwrap_err();
        assert!(matches!(err, GritError::VersionIncompatibility(_)));
    }

    #[test]
    fn test_policy_log_error() {
        let options = ExportOptions::default()
            .with_version(SchemaVersion::V1_1)
            .with_version_incompatibility_behavior(IncompatibilityBehavior::LogError);
        let mut ctx = context(&options);
        assert!(!ctx
            .check_minimum_version("generator", "ratedS", ErrorMessage::NotDefaultNotSupported, SchemaVersion::V1_5)
            .unwrap());
        assert_eq!(ctx.diagnostics.warning_count(), 1);
    }

    #[test]
    fn test_default_value_needs_no_gate() {
        let options = ExportOptions::default().with_version(SchemaVersion::V1_0);
        let mut ctx = context(&options);
        ctx.start_node("generator").unwrap();
        ctx.write_double_attribute_from_minimum_version("generator", "ratedS", f64::NAN, f64::NAN, SchemaVersion::V1_5)
            .unwrap();
        ctx.write_boolean_attribute_from_minimum_version("generator", "isCondenser", false, false, SchemaVersion::V1_13)
            .unwrap();
        let err = ctx
            .write_boolean_attribute_from_minimum_version("generator", "isCondenser", true, false, SchemaVersion::V1_13)
            .unwrap_err();
        assert!(err.to_string().contains("generator.isCondenser"));
    }
}
