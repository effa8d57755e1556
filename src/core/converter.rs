// src/core/converter.rs

//! # Type Converter
//!
//! Turns the text values of an argument map into the typed values a command
//! declares. Conversions are plain functions registered per [`TypeKey`]; the
//! defaults cover text, the integer and float primitives, booleans, calendar
//! dates, paths, and comma-separated sequences of all of those. Enumerations
//! opt in through [`Enumeration`] and [`TypeConverter::register_enum`].

use crate::models::{Object, TypeKey};
use chrono::{NaiveDate, NaiveDateTime};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("No conversion is registered for type {type_name}.")]
    Unsupported { type_name: String },
    #[error("Cannot convert '{value}' to {type_name}: {reason}")]
    Malformed {
        value: String,
        type_name: String,
        reason: String,
    },
    #[error("'{value}' is not a valid {type_name}. Valid values are: {}.", valid.join(", "))]
    InvalidEnumeration {
        value: String,
        type_name: String,
        valid: Vec<String>,
    },
    #[error("Expected a value of type {expected}, but a {found} was supplied.")]
    TypeMismatch { expected: String, found: String },
}

type ConversionResult<T> = Result<T, ConversionError>;
type ParseFn<T> = dyn Fn(&str) -> ConversionResult<T>;
type ErasedParseFn = Box<dyn Fn(&str) -> ConversionResult<Object>>;

/// A closed set of named values that can be selected by (a suffix of) their name.
pub trait Enumeration: Sized + Clone + 'static {
    /// Every value, in declaration order.
    fn variants() -> &'static [Self];
    /// The name used on the command line.
    fn name(&self) -> &'static str;
}

struct Parser {
    erased: ErasedParseFn,
    /// The `Rc<ParseFn<T>>` the erased function wraps, kept so that sequence
    /// parsers can reuse the element parser without downcasting every element.
    typed: Box<dyn Any>,
}

/// A pluggable table of string-to-value conversions.
pub struct TypeConverter {
    parsers: HashMap<TypeKey, Parser>,
}

impl fmt::Debug for TypeConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.parsers.keys().map(TypeKey::short_name).collect();
        names.sort();
        f.debug_struct("TypeConverter")
            .field("types", &names)
            .finish()
    }
}

impl Default for TypeConverter {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! register_parsed {
    ($converter:expr, $($ty:ty),+ $(,)?) => {
        $(
            $converter.register::<$ty>(|s| {
                s.trim()
                    .parse::<$ty>()
                    .map_err(|e| malformed(s, TypeKey::of::<$ty>(), e))
            });
            $converter.register_sequence::<$ty>();
        )+
    };
}

impl TypeConverter {
    /// A converter with no conversions at all.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// A converter with the default conversions installed.
    pub fn new() -> Self {
        let mut converter = Self::empty();

        converter.register::<String>(|s| Ok(s.to_string()));
        converter.register_sequence::<String>();

        register_parsed!(
            converter, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64
        );

        converter.register::<bool>(parse_bool);
        converter.register_sequence::<bool>();

        converter.register::<NaiveDate>(parse_date);
        converter.register_sequence::<NaiveDate>();

        converter.register::<NaiveDateTime>(parse_date_time);
        converter.register_sequence::<NaiveDateTime>();

        converter.register::<PathBuf>(|s| Ok(PathBuf::from(s.trim())));
        converter.register_sequence::<PathBuf>();

        converter
    }

    /// Installs (or replaces) the conversion for `T`.
    pub fn register<T: 'static>(
        &mut self,
        parse: impl Fn(&str) -> ConversionResult<T> + 'static,
    ) {
        let typed: Rc<ParseFn<T>> = Rc::new(parse);
        let inner = Rc::clone(&typed);
        let erased: ErasedParseFn = Box::new(move |s| (*inner)(s).map(|v| Rc::new(v) as Object));
        log::debug!("Registered conversion for {}", TypeKey::of::<T>());
        self.parsers.insert(
            TypeKey::of::<T>(),
            Parser {
                erased,
                typed: Box::new(typed),
            },
        );
    }

    /// Installs the conversion for `Vec<T>`: the input is split on commas and
    /// each element is converted with the conversion for `T`.
    ///
    /// Returns `false` (and registers nothing) if `T` itself cannot be converted.
    pub fn register_sequence<T: 'static>(&mut self) -> bool {
        let Some(element) = self.typed_parser::<T>() else {
            return false;
        };
        self.register::<Vec<T>>(move |s| {
            if s.trim().is_empty() {
                return Ok(Vec::new());
            }
            s.split(',').map(|part| (*element)(part.trim())).collect()
        });
        true
    }

    /// Installs the conversions for an enumeration and for sequences of it.
    pub fn register_enum<E: Enumeration>(&mut self) {
        self.register::<E>(parse_enumeration::<E>);
        self.register_sequence::<E>();
    }

    fn typed_parser<T: 'static>(&self) -> Option<Rc<ParseFn<T>>> {
        self.parsers
            .get(&TypeKey::of::<T>())
            .and_then(|p| p.typed.downcast_ref::<Rc<ParseFn<T>>>())
            .cloned()
    }

    pub fn can_convert(&self, target: TypeKey) -> bool {
        self.parsers.contains_key(&target)
    }

    /// Converts `value` into an erased instance of `target`.
    pub fn convert(&self, value: &str, target: TypeKey) -> ConversionResult<Object> {
        let parser = self
            .parsers
            .get(&target)
            .ok_or_else(|| ConversionError::Unsupported {
                type_name: target.short_name(),
            })?;
        (parser.erased)(value)
    }

    /// Typed convenience over [`convert`](Self::convert).
    pub fn convert_to<T: 'static>(&self, value: &str) -> ConversionResult<T> {
        let parser = self
            .typed_parser::<T>()
            .ok_or_else(|| ConversionError::Unsupported {
                type_name: TypeKey::of::<T>().short_name(),
            })?;
        (*parser)(value)
    }
}

// --- DEFAULT CONVERSIONS ---

fn malformed(value: &str, target: TypeKey, reason: impl fmt::Display) -> ConversionError {
    ConversionError::Malformed {
        value: value.to_string(),
        type_name: target.short_name(),
        reason: reason.to_string(),
    }
}

fn parse_bool(s: &str) -> ConversionResult<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Ok(true),
        "false" | "f" | "no" | "n" => Ok(false),
        _ => Err(malformed(
            s,
            TypeKey::of::<bool>(),
            "expected true/false or yes/no",
        )),
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y"];
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_date(s: &str) -> ConversionResult<NaiveDate> {
    let trimmed = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| malformed(s, TypeKey::of::<NaiveDate>(), "unrecognized date format"))
}

fn parse_date_time(s: &str) -> ConversionResult<NaiveDateTime> {
    let trimmed = s.trim();
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| parse_date(trimmed).ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
        .ok_or_else(|| {
            malformed(
                s,
                TypeKey::of::<NaiveDateTime>(),
                "unrecognized date/time format",
            )
        })
}

/// Exact (case-insensitive) name first; otherwise the single variant whose
/// name ends with the input.
fn parse_enumeration<E: Enumeration>(s: &str) -> ConversionResult<E> {
    let wanted = s.trim().to_ascii_lowercase();
    let variants = E::variants();

    if let Some(exact) = variants
        .iter()
        .find(|v| v.name().eq_ignore_ascii_case(&wanted))
    {
        return Ok(exact.clone());
    }

    let mut suffix_matches = variants
        .iter()
        .filter(|v| !wanted.is_empty() && v.name().to_ascii_lowercase().ends_with(&wanted));

    match (suffix_matches.next(), suffix_matches.next()) {
        (Some(only), None) => Ok(only.clone()),
        _ => Err(ConversionError::InvalidEnumeration {
            value: s.to_string(),
            type_name: TypeKey::of::<E>().short_name(),
            valid: variants.iter().map(|v| v.name().to_string()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::downcast;

    #[derive(Debug, Clone, PartialEq)]
    enum Heading {
        NorthEast,
        Eastern,
        SouthEastern,
    }

    impl Enumeration for Heading {
        fn variants() -> &'static [Self] {
            &[Self::NorthEast, Self::Eastern, Self::SouthEastern]
        }
        fn name(&self) -> &'static str {
            match self {
                Self::NorthEast => "NorthEast",
                Self::Eastern => "Eastern",
                Self::SouthEastern => "SouthEastern",
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Corner {
        NorthEast,
        SouthEast,
    }

    impl Enumeration for Corner {
        fn variants() -> &'static [Self] {
            &[Self::NorthEast, Self::SouthEast]
        }
        fn name(&self) -> &'static str {
            match self {
                Self::NorthEast => "NorthEast",
                Self::SouthEast => "SouthEast",
            }
        }
    }

    #[test]
    fn test_text_and_numbers() {
        let converter = TypeConverter::new();
        assert_eq!(converter.convert_to::<String>(" keep ").unwrap(), " keep ");
        assert_eq!(converter.convert_to::<i32>(" -42 ").unwrap(), -42);
        assert_eq!(converter.convert_to::<f64>("2.5").unwrap(), 2.5);
        assert!(matches!(
            converter.convert_to::<u8>("abc"),
            Err(ConversionError::Malformed { .. })
        ));
        assert!(converter.convert_to::<u8>("256").is_err());
    }

    #[test]
    fn test_booleans_accept_words_and_abbreviations() {
        let converter = TypeConverter::new();
        for yes in ["true", "TRUE", "t", "Yes", "y"] {
            assert!(converter.convert_to::<bool>(yes).unwrap(), "{}", yes);
        }
        for no in ["false", "No", "n", "F"] {
            assert!(!converter.convert_to::<bool>(no).unwrap(), "{}", no);
        }
        assert!(converter.convert_to::<bool>("maybe").is_err());
    }

    #[test]
    fn test_dates() {
        let converter = TypeConverter::new();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(converter.convert_to::<NaiveDate>("2024-03-09").unwrap(), expected);
        assert_eq!(converter.convert_to::<NaiveDate>("09.03.2024").unwrap(), expected);
        assert!(converter.convert_to::<NaiveDate>("2024-13-40").is_err());

        let stamp = converter
            .convert_to::<NaiveDateTime>("2024-03-09 10:30")
            .unwrap();
        assert_eq!(stamp.date(), expected);
    }

    #[test]
    fn test_enumeration_prefers_exact_then_unique_suffix() {
        let mut converter = TypeConverter::new();
        converter.register_enum::<Heading>();

        assert_eq!(converter.convert_to::<Heading>("eastern").unwrap(), Heading::Eastern);
        // "EAST" is a substring of all three names but the suffix of only one.
        assert_eq!(converter.convert_to::<Heading>("EAST").unwrap(), Heading::NorthEast);
    }

    #[test]
    fn test_enumeration_ambiguous_suffix_fails_and_lists_values() {
        let mut converter = TypeConverter::new();
        converter.register_enum::<Corner>();

        let err = converter.convert_to::<Corner>("east").unwrap_err();
        match err {
            ConversionError::InvalidEnumeration { valid, .. } => {
                assert_eq!(valid, vec!["NorthEast", "SouthEast"]);
            }
            other => panic!("Unexpected error: {:?}", other),
        }
        assert!(converter.convert_to::<Corner>("west").is_err());
        assert!(converter.convert_to::<Corner>("").is_err());
    }

    #[test]
    fn test_sequences_split_on_commas() {
        let mut converter = TypeConverter::new();
        converter.register_enum::<Corner>();

        assert_eq!(
            converter.convert_to::<Vec<i64>>("1, 2,3").unwrap(),
            vec![1, 2, 3]
        );
        assert_eq!(
            converter.convert_to::<Vec<Corner>>("northeast,SouthEast").unwrap(),
            vec![Corner::NorthEast, Corner::SouthEast]
        );
        assert!(converter.convert_to::<Vec<String>>("").unwrap().is_empty());
        // Element failures propagate.
        assert!(matches!(
            converter.convert_to::<Vec<u16>>("1,x"),
            Err(ConversionError::Malformed { value, .. }) if value == "x"
        ));
    }

    #[test]
    fn test_erased_conversion_and_unsupported_types() {
        struct Opaque;

        let converter = TypeConverter::new();
        let object = converter.convert("7", TypeKey::of::<u64>()).unwrap();
        assert_eq!(downcast::<u64>(&object).as_deref(), Some(&7));

        assert!(!converter.can_convert(TypeKey::of::<Opaque>()));
        assert!(matches!(
            converter.convert("x", TypeKey::of::<Opaque>()),
            Err(ConversionError::Unsupported { .. })
        ));
        assert!(!TypeConverter::empty().register_sequence::<Opaque>());
    }

    #[test]
    fn test_custom_conversion_replaces_default() {
        let mut converter = TypeConverter::new();
        converter.register::<i32>(|s| Ok(s.len() as i32));
        assert_eq!(converter.convert_to::<i32>("abcd").unwrap(), 4);
    }
}
