//! Diagnostics reported by a generation pass
//!
//! Generator faults, module build problems and load failures never abort a pass. They are reported here as
//! [`Diagnostic`] values with stable identifiers, so a host can surface them like compiler errors.

use std::fmt;

use microgen_sdk::{Fault, SourceLocation};

use crate::build::{CompilerMessage, MessageLevel};

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Static description of one kind of diagnostic.
///
/// `message_format` takes positional arguments `{0}`..`{3}`: the generator's identity, the fault category,
/// the captured trace and the fault message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticDescriptor {
    pub id: &'static str,
    pub title: &'static str,
    pub message_format: &'static str,
    pub category: &'static str,
    pub severity: Severity,
}

impl DiagnosticDescriptor {
    /// Substitute `{N}` placeholders with `args[N]`. Missing arguments are left as written.
    pub fn format(&self, args: &[&str]) -> String {
        let mut out = String::with_capacity(self.message_format.len());
        let mut rest = self.message_format;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                return out;
            };
            match after[..close].parse::<usize>().ok().and_then(|i| args.get(i)) {
                Some(arg) => out.push_str(arg),
                None => out.push_str(&rest[open..open + close + 2]),
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

const CATEGORY: &str = "MicroSourceGenerator";

pub const SOURCE_PRODUCTION_FAILURE: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSG001",
    title: "Source Production Failure",
    message_format: "Generator '{0}' failed to produce source and {1} was raised. Trace: {2}. Message: {3}.",
    category: CATEGORY,
    severity: Severity::Error,
};

pub const SYNTAX_FILTERING_FAILURE: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSG002",
    title: "Syntax Filtering Failure",
    message_format: "Generator '{0}' failed to filter syntax and {1} was raised. Trace: {2}. Message: {3}.",
    category: CATEGORY,
    severity: Severity::Error,
};

pub const INITIALIZATION_FAILURE: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSG003",
    title: "Generator Initialization Failure",
    message_format: "Generator '{0}' failed to initialize and {1} was raised. Trace: {2}. Message: {3}.",
    category: CATEGORY,
    severity: Severity::Error,
};

pub const CONSTRUCTION_FAILURE: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSG004",
    title: "Generator Construction Failure",
    message_format: "Generator '{0}' could not be constructed and {1} was raised. Trace: {2}. Message: {3}.",
    category: CATEGORY,
    severity: Severity::Error,
};

pub const MODULE_LOAD_FAILURE: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSG005",
    title: "Generator Module Load Failure",
    message_format: "Generator module '{0}' failed to load and {1} was raised. Trace: {2}. Message: {3}.",
    category: CATEGORY,
    severity: Severity::Error,
};

pub const MODULE_BUILD_FAILURE: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "MSG006",
    title: "Generator Module Build Failure",
    message_format: "Generator module '{0}' could not be built and {1} was raised. Trace: {2}. Message: {3}.",
    category: CATEGORY,
    severity: Severity::Error,
};

/// Every descriptor this crate reports, by id.
pub const CATALOGUE: [DiagnosticDescriptor; 6] = [
    SOURCE_PRODUCTION_FAILURE,
    SYNTAX_FILTERING_FAILURE,
    INITIALIZATION_FAILURE,
    CONSTRUCTION_FAILURE,
    MODULE_LOAD_FAILURE,
    MODULE_BUILD_FAILURE,
];

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Stable identifier: `MSG00N` for pipeline diagnostics, rustc's code (`E0412`) for forwarded ones
    pub id: String,
    pub title: String,
    pub severity: Severity,
    pub message: String,
    pub location: Option<SourceLocation>,
    /// Pre-rendered text from the reporting tool, when it supplied one
    pub rendered: Option<String>,
}

impl Diagnostic {
    pub fn new(descriptor: &DiagnosticDescriptor, args: &[&str], location: Option<SourceLocation>) -> Self {
        Self {
            id: descriptor.id.to_string(),
            title: descriptor.title.to_string(),
            severity: descriptor.severity,
            message: descriptor.format(args),
            location,
            rendered: None,
        }
    }

    /// Report a captured fault of generator `subject`.
    pub fn from_fault(
        descriptor: &DiagnosticDescriptor,
        subject: &str,
        fault: &Fault,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::new(descriptor, &[subject, &fault.category, &fault.trace, &fault.message], location)
    }

    pub fn production_failure(generator: &str, fault: &Fault, location: SourceLocation) -> Self {
        Self::from_fault(&SOURCE_PRODUCTION_FAILURE, generator, fault, Some(location))
    }

    pub fn filter_failure(generator: &str, fault: &Fault, location: SourceLocation) -> Self {
        Self::from_fault(&SYNTAX_FILTERING_FAILURE, generator, fault, Some(location))
    }

    pub fn initialization_failure(generator: &str, fault: &Fault) -> Self {
        Self::from_fault(&INITIALIZATION_FAILURE, generator, fault, None)
    }

    pub fn construction_failure(generator: &str, fault: &Fault) -> Self {
        Self::from_fault(&CONSTRUCTION_FAILURE, generator, fault, None)
    }

    /// Report an error from loading the module `module`; the trace is the error's source chain.
    pub fn module_load_failure(module: &str, error: &(dyn std::error::Error + 'static)) -> Self {
        Self::from_fault(&MODULE_LOAD_FAILURE, module, &error_fault("LoadError", error), None)
    }

    pub fn module_build_failure(module: &str, error: &(dyn std::error::Error + 'static)) -> Self {
        Self::from_fault(&MODULE_BUILD_FAILURE, module, &error_fault("BuildError", error), None)
    }

    /// Forward a message from compiling the generator module unchanged.
    pub fn from_compiler(message: &CompilerMessage) -> Self {
        let severity = match message.level {
            MessageLevel::Error => Severity::Error,
            MessageLevel::Warning => Severity::Warning,
            MessageLevel::Note => Severity::Info,
        };
        Self {
            id: message.code.clone().unwrap_or_else(|| "rustc".to_string()),
            title: format!("Generator module {severity}"),
            severity,
            message: message.message.clone(),
            location: message.location.clone(),
            rendered: message.rendered.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Human-readable report with the offending source line when `source` is the located file's text.
    pub fn render(&self, source: Option<&str>) -> String {
        let mut out = format!("{}[{}]: {}\n", self.severity, self.id, self.message);
        let Some(location) = &self.location else {
            return out;
        };
        out.push_str(&format!("  --> {location}\n"));
        if let Some(line_text) = source.and_then(|s| s.lines().nth(location.line.saturating_sub(1))) {
            let width = location.line.to_string().len();
            out.push_str(&format!("  {:>width$} |\n", ""));
            out.push_str(&format!("  {:>width$} | {}\n", location.line, line_text));
            out.push_str(&format!(
                "  {:>width$} | {}^\n",
                "",
                " ".repeat(location.column.saturating_sub(1))
            ));
        }
        out
    }
}

fn error_fault(category: &str, error: &(dyn std::error::Error + 'static)) -> Fault {
    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    let trace = if chain.is_empty() {
        "<none>".to_string()
    } else {
        chain.join(" <- ")
    };
    Fault::new(category, trace, error.to_string())
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} {}: {} ({location})", self.severity, self.id, self.message),
            None => write!(f, "{} {}: {}", self.severity, self.id, self.message),
        }
    }
}

impl std::error::Error for Diagnostic {}

impl miette::Diagnostic for Diagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.id))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
            Severity::Info => miette::Severity::Advice,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault() -> Fault {
        Fault::new("panic", "at src/lib.rs:3:5", "boom")
    }

    #[test]
    fn test_format_substitutes_positional_arguments() {
        let message = SYNTAX_FILTERING_FAILURE.format(&["Gen", "panic", "trace", "boom"]);
        assert_eq!(
            message,
            "Generator 'Gen' failed to filter syntax and panic was raised. Trace: trace. Message: boom."
        );
    }

    #[test]
    fn test_format_keeps_unknown_placeholders() {
        let descriptor = DiagnosticDescriptor {
            message_format: "{0} and {7} and {x",
            ..SOURCE_PRODUCTION_FAILURE
        };
        assert_eq!(descriptor.format(&["a"]), "a and {7} and {x");
    }

    #[test]
    fn test_catalogue_ids_are_unique_and_errors() {
        let mut ids: Vec<_> = CATALOGUE.iter().map(|d| d.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), CATALOGUE.len());
        assert!(CATALOGUE.iter().all(|d| d.severity == Severity::Error));
    }

    #[test]
    fn test_filter_failure_carries_location() {
        let location = SourceLocation::new("src/lib.rs", 4, 1);
        let diagnostic = Diagnostic::filter_failure("Gen", &fault(), location.clone());
        assert_eq!(diagnostic.id, "MSG002");
        assert_eq!(diagnostic.location, Some(location));
        assert!(diagnostic.message.contains("'Gen'"));
        assert!(diagnostic.is_error());
    }

    #[test]
    fn test_initialization_failure_has_no_location() {
        let diagnostic = Diagnostic::initialization_failure("Gen", &fault());
        assert_eq!(diagnostic.id, "MSG003");
        assert!(diagnostic.location.is_none());
    }

    #[test]
    fn test_module_build_failure_uses_error_chain() {
        let error = std::io::Error::new(std::io::ErrorKind::NotFound, "cargo not found");
        let diagnostic = Diagnostic::module_build_failure("microgen_module_1", &error);
        assert_eq!(diagnostic.id, "MSG006");
        assert!(diagnostic.message.contains("cargo not found"));
        assert!(diagnostic.message.contains("BuildError"));
    }

    #[test]
    fn test_render_points_at_column() {
        let diagnostic = Diagnostic::filter_failure("Gen", &fault(), SourceLocation::new("src/lib.rs", 2, 5));
        let rendered = diagnostic.render(Some("mod a;\npub struct A;\n"));
        assert!(rendered.starts_with("error[MSG002]"));
        assert!(rendered.contains("--> src/lib.rs:2:5"));
        assert!(rendered.contains("2 | pub struct A;"));
        assert!(rendered.contains("|     ^"));
    }

    #[test]
    fn test_miette_code() {
        use miette::Diagnostic as _;
        let diagnostic = Diagnostic::initialization_failure("Gen", &fault());
        assert_eq!(diagnostic.code().map(|c| c.to_string()).as_deref(), Some("MSG003"));
    }
}
