//! Process-wide configuration store
//!
//! Owns every mutable setting the trigger paths read: the event mask,
//! the trigger signal number, the verbose flag and the output name and
//! directory overrides. All writes go through the setters here (driven
//! by the lifecycle API); reads are lock-free where a trigger callback
//! needs them.

use crate::error::ReportError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::Mutex;

/// Longest accepted report filename, in bytes. Longer names are rejected
/// with `InvalidArgument`, never truncated.
pub const MAX_FILENAME_LEN: usize = 128;

/// Default trigger signal when none is configured.
pub const DEFAULT_SIGNAL: i32 = signal_hook::consts::SIGUSR2;

// =============================================================================
// Event classes and mask
// =============================================================================

const BIT_APICALL: u8 = 1 << 0;
const BIT_FATALERROR: u8 = 1 << 1;
const BIT_EXCEPTION: u8 = 1 << 2;
const BIT_SIGNAL: u8 = 1 << 3;

/// The four categories of event that can produce a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventClass {
    ApiCall,
    FatalError,
    Exception,
    Signal,
}

impl EventClass {
    fn bit(self) -> u8 {
        match self {
            EventClass::ApiCall => BIT_APICALL,
            EventClass::FatalError => BIT_FATALERROR,
            EventClass::Exception => BIT_EXCEPTION,
            EventClass::Signal => BIT_SIGNAL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventClass::ApiCall => "apicall",
            EventClass::FatalError => "fatalerror",
            EventClass::Exception => "exception",
            EventClass::Signal => "signal",
        }
    }
}

/// Set of enabled trigger classes.
///
/// `ApiCall` has no gating flag: an explicit API call is always allowed
/// to produce a report, so `contains(EventClass::ApiCall)` is true for
/// every mask regardless of the stored bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventMask(u8);

impl EventMask {
    pub const EMPTY: EventMask = EventMask(0);

    /// Parse a delimiter-separated list of event names. Recognized names
    /// are `apicall`, `fatalerror`, `exception` and `signal`, separated
    /// by commas, plus signs or whitespace. Unknown names are rejected.
    pub fn parse(spec: &str) -> Result<EventMask, ReportError> {
        let mut bits = 0u8;
        for token in spec.split([',', '+', ' ']) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            bits |= match token.to_ascii_lowercase().as_str() {
                "apicall" => BIT_APICALL,
                "fatalerror" => BIT_FATALERROR,
                "exception" => BIT_EXCEPTION,
                "signal" => BIT_SIGNAL,
                other => {
                    return Err(ReportError::InvalidArgument(format!(
                        "unrecognized event name: {other}"
                    )))
                }
            };
        }
        Ok(EventMask(bits))
    }

    pub fn contains(self, class: EventClass) -> bool {
        // API-call triggers are always explicit, so never gated.
        class == EventClass::ApiCall || self.0 & class.bit() != 0
    }

    fn bits(self) -> u8 {
        self.0
    }
}

// =============================================================================
// Store
// =============================================================================

static EVENT_MASK: AtomicU8 = AtomicU8::new(BIT_APICALL);
static VERBOSE: AtomicBool = AtomicBool::new(false);
static SIGNAL_NUMBER: AtomicI32 = AtomicI32::new(DEFAULT_SIGNAL);

#[derive(Default)]
struct OutputSettings {
    filename: Option<String>,
    directory: Option<PathBuf>,
}

static OUTPUT: Mutex<OutputSettings> = Mutex::new(OutputSettings {
    filename: None,
    directory: None,
});

/// Atomically replace the active mask, returning the previous one so the
/// caller can react to transitions (arming/disarming the signal relay).
pub fn replace_event_mask(mask: EventMask) -> EventMask {
    EventMask(EVENT_MASK.swap(mask.bits(), Ordering::SeqCst))
}

pub fn event_mask() -> EventMask {
    EventMask(EVENT_MASK.load(Ordering::SeqCst))
}

pub fn set_verbose(on: bool) {
    VERBOSE.store(on, Ordering::SeqCst);
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Parse a boolean-like switch value: 1/true/yes/on enable, anything
/// else disables.
pub fn parse_verbose_switch(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn set_signal_number(signo: i32) -> Result<(), ReportError> {
    if !(1..=64).contains(&signo) {
        return Err(ReportError::InvalidArgument(format!(
            "signal number out of range: {signo}"
        )));
    }
    SIGNAL_NUMBER.store(signo, Ordering::SeqCst);
    Ok(())
}

pub fn signal_number() -> i32 {
    SIGNAL_NUMBER.load(Ordering::SeqCst)
}

/// Parse a signal spec: a name with or without the SIG prefix
/// ("SIGUSR2", "usr2") or a raw number ("12").
pub fn parse_signal_spec(spec: &str) -> Result<i32, ReportError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(ReportError::InvalidArgument("empty signal spec".into()));
    }
    if let Ok(signo) = spec.parse::<i32>() {
        if (1..=64).contains(&signo) {
            return Ok(signo);
        }
        return Err(ReportError::InvalidArgument(format!(
            "signal number out of range: {signo}"
        )));
    }
    let mut name = spec.to_ascii_uppercase();
    if !name.starts_with("SIG") {
        name = format!("SIG{name}");
    }
    for signal in nix::sys::signal::Signal::iterator() {
        if signal.as_str() == name {
            return Ok(signal as i32);
        }
    }
    Err(ReportError::InvalidArgument(format!(
        "unrecognized signal: {spec}"
    )))
}

/// Human-readable name for a signal number ("SIGUSR2"), or "unknown".
pub fn signal_name(signo: i32) -> &'static str {
    match nix::sys::signal::Signal::try_from(signo) {
        Ok(signal) => signal.as_str(),
        Err(_) => "unknown",
    }
}

/// Set the configured report filename. Rejects empty names, names longer
/// than `MAX_FILENAME_LEN` and names containing path separators; on
/// rejection the previously configured name is left untouched.
pub fn set_filename(name: &str) -> Result<(), ReportError> {
    validate_filename(name)?;
    let mut output = OUTPUT.lock().unwrap_or_else(|e| e.into_inner());
    output.filename = Some(name.to_string());
    Ok(())
}

pub fn validate_filename(name: &str) -> Result<(), ReportError> {
    if name.is_empty() {
        return Err(ReportError::InvalidArgument("empty filename".into()));
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err(ReportError::InvalidArgument(format!(
            "filename longer than {MAX_FILENAME_LEN} bytes"
        )));
    }
    if name.contains(['/', '\\']) {
        return Err(ReportError::InvalidArgument(
            "filename must not contain path separators".into(),
        ));
    }
    Ok(())
}

pub fn filename() -> Option<String> {
    let output = OUTPUT.lock().unwrap_or_else(|e| e.into_inner());
    output.filename.clone()
}

pub fn set_directory(path: &Path) {
    let mut output = OUTPUT.lock().unwrap_or_else(|e| e.into_inner());
    output.directory = Some(path.to_path_buf());
}

pub fn directory() -> Option<PathBuf> {
    let output = OUTPUT.lock().unwrap_or_else(|e| e.into_inner());
    output.directory.clone()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_event() {
        let mask = EventMask::parse("signal").unwrap();
        assert!(mask.contains(EventClass::Signal));
        assert!(!mask.contains(EventClass::FatalError));
        assert!(!mask.contains(EventClass::Exception));
    }

    #[test]
    fn test_parse_event_list_delimiters() {
        for spec in [
            "fatalerror,exception,signal",
            "fatalerror+exception+signal",
            "fatalerror exception signal",
            " fatalerror , exception , signal ",
        ] {
            let mask = EventMask::parse(spec).unwrap();
            assert!(mask.contains(EventClass::FatalError), "spec: {spec}");
            assert!(mask.contains(EventClass::Exception), "spec: {spec}");
            assert!(mask.contains(EventClass::Signal), "spec: {spec}");
        }
    }

    #[test]
    fn test_parse_event_case_insensitive() {
        let mask = EventMask::parse("FatalError,SIGNAL").unwrap();
        assert!(mask.contains(EventClass::FatalError));
        assert!(mask.contains(EventClass::Signal));
    }

    #[test]
    fn test_parse_unknown_event_rejected() {
        assert!(matches!(
            EventMask::parse("signal,bogus"),
            Err(ReportError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_spec_is_empty_mask() {
        let mask = EventMask::parse("").unwrap();
        assert_eq!(mask, EventMask::EMPTY);
        assert!(!mask.contains(EventClass::Signal));
    }

    #[test]
    fn test_apicall_always_enabled() {
        assert!(EventMask::EMPTY.contains(EventClass::ApiCall));
        let mask = EventMask::parse("fatalerror").unwrap();
        assert!(mask.contains(EventClass::ApiCall));
    }

    #[test]
    fn test_parse_signal_spec_forms() {
        let expected = signal_hook::consts::SIGUSR2;
        assert_eq!(parse_signal_spec("SIGUSR2").unwrap(), expected);
        assert_eq!(parse_signal_spec("usr2").unwrap(), expected);
        assert_eq!(parse_signal_spec(&expected.to_string()).unwrap(), expected);
    }

    #[test]
    fn test_parse_signal_spec_rejects_garbage() {
        assert!(parse_signal_spec("").is_err());
        assert!(parse_signal_spec("SIGNOPE").is_err());
        assert!(parse_signal_spec("-3").is_err());
        assert!(parse_signal_spec("9999").is_err());
    }

    #[test]
    fn test_signal_name_round_trip() {
        assert_eq!(signal_name(signal_hook::consts::SIGUSR2), "SIGUSR2");
        assert_eq!(signal_name(0), "unknown");
    }

    #[test]
    fn test_parse_verbose_switch() {
        assert!(parse_verbose_switch("1"));
        assert!(parse_verbose_switch("true"));
        assert!(parse_verbose_switch("YES"));
        assert!(parse_verbose_switch(" on "));
        assert!(!parse_verbose_switch("0"));
        assert!(!parse_verbose_switch("off"));
        assert!(!parse_verbose_switch(""));
    }

    #[test]
    fn test_validate_filename_bounds() {
        assert!(validate_filename("report.json").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename(&"x".repeat(MAX_FILENAME_LEN)).is_ok());
        assert!(validate_filename(&"x".repeat(MAX_FILENAME_LEN + 1)).is_err());
        assert!(validate_filename("a/b.json").is_err());
    }

    #[test]
    fn test_set_signal_number_bounds() {
        assert!(set_signal_number(0).is_err());
        assert!(set_signal_number(65).is_err());
        assert!(set_signal_number(DEFAULT_SIGNAL).is_ok());
        assert_eq!(signal_number(), DEFAULT_SIGNAL);
    }
}
