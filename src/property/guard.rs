use std::fmt;
use std::ops::RangeInclusive;

/// Gate applied to every candidate value before it is stored.
pub trait Validator<T>: Send + Sync {
    fn validate(&self, value: &T) -> bool;

    /// Human-readable reason reported when `validate` rejects `value`.
    fn error_message(&self, value: &T) -> String;
}

/// Bidirectional mapping between the stored and the observed representation.
pub trait Transformer<T>: Send + Sync {
    /// Applied on the way in, before the value is stored.
    fn set(&self, value: T) -> T;

    /// Applied on the way out, when the value is read.
    fn get(&self, value: &T) -> T;
}

/// Per-property write policy. Validation and transformation are mutually
/// exclusive on a single property.
pub enum Guard<T> {
    None,
    Validator(Box<dyn Validator<T>>),
    Transformer(Box<dyn Transformer<T>>),
}

impl<T> Guard<T> {
    pub fn none() -> Self {
        Guard::None
    }

    pub fn validator(validator: impl Validator<T> + 'static) -> Self {
        Guard::Validator(Box::new(validator))
    }

    pub fn transformer(transformer: impl Transformer<T> + 'static) -> Self {
        Guard::Transformer(Box::new(transformer))
    }
}

impl<T> Default for Guard<T> {
    fn default() -> Self {
        Guard::None
    }
}

impl<T> fmt::Debug for Guard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::None => write!(f, "Guard::None"),
            Guard::Validator(_) => write!(f, "Guard::Validator"),
            Guard::Transformer(_) => write!(f, "Guard::Transformer"),
        }
    }
}

/// Validator built from a predicate and a message function.
pub struct FnValidator<P, M> {
    predicate: P,
    message: M,
}

impl<P, M> FnValidator<P, M> {
    pub fn new(predicate: P, message: M) -> Self {
        Self { predicate, message }
    }
}

impl<T, P, M> Validator<T> for FnValidator<P, M>
where
    P: Fn(&T) -> bool + Send + Sync,
    M: Fn(&T) -> String + Send + Sync,
{
    fn validate(&self, value: &T) -> bool {
        (self.predicate)(value)
    }

    fn error_message(&self, value: &T) -> String {
        (self.message)(value)
    }
}

/// Transformer built from a pair of closures.
pub struct FnTransformer<S, G> {
    set: S,
    get: G,
}

impl<S, G> FnTransformer<S, G> {
    pub fn new(set: S, get: G) -> Self {
        Self { set, get }
    }
}

impl<T, S, G> Transformer<T> for FnTransformer<S, G>
where
    S: Fn(T) -> T + Send + Sync,
    G: Fn(&T) -> T + Send + Sync,
{
    fn set(&self, value: T) -> T {
        (self.set)(value)
    }

    fn get(&self, value: &T) -> T {
        (self.get)(value)
    }
}

/// Accepts strings whose character count lies within an inclusive range.
#[derive(Debug, Clone)]
pub struct LengthValidator {
    range: RangeInclusive<usize>,
}

impl LengthValidator {
    pub fn new(min: usize, max: usize) -> Self {
        Self { range: min..=max }
    }
}

impl Validator<String> for LengthValidator {
    fn validate(&self, value: &String) -> bool {
        self.range.contains(&value.chars().count())
    }

    fn error_message(&self, value: &String) -> String {
        format!(
            "length must be between {} and {} characters, got {}",
            self.range.start(),
            self.range.end(),
            value.chars().count()
        )
    }
}

/// Accepts values within an inclusive range.
#[derive(Debug, Clone)]
pub struct RangeValidator<T> {
    range: RangeInclusive<T>,
}

impl<T> RangeValidator<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { range: min..=max }
    }
}

impl<T> Validator<T> for RangeValidator<T>
where
    T: PartialOrd + fmt::Debug + Send + Sync,
{
    fn validate(&self, value: &T) -> bool {
        self.range.contains(value)
    }

    fn error_message(&self, value: &T) -> String {
        format!(
            "{:?} is outside of {:?}..={:?}",
            value,
            self.range.start(),
            self.range.end()
        )
    }
}
