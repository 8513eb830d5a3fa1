use std::{collections::BTreeSet, fmt};

use crate::jose::{ErrorKind, JoseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// How the identifiers of an [`AlgorithmConstraints`] are interpreted.
pub enum ConstraintType {
    /// Only the listed identifiers are allowed.
    Permit,
    /// Everything but the listed identifiers is allowed.
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Allow or deny list of algorithm identifiers.
///
/// Consumers check the declared "alg" (and "enc" for JWE) against
/// these constraints before any cryptographic work is done.
pub struct AlgorithmConstraints {
    kind: ConstraintType,
    ids: BTreeSet<String>,
}

impl AlgorithmConstraints {
    /// Create new constraints of the given type.
    pub fn new<I, S>(kind: ConstraintType, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Only allow the given identifiers.
    pub fn permit<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ConstraintType::Permit, ids)
    }

    /// Allow everything except the given identifiers.
    pub fn block<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ConstraintType::Block, ids)
    }

    /// Allow every algorithm.
    pub fn no_constraints() -> Self {
        Self::block(std::iter::empty::<String>())
    }

    /// Allow everything but the unsecured "none" algorithm.
    pub fn disallow_none() -> Self {
        Self::block(["none"])
    }

    /// Only allow the unsecured "none" algorithm.
    pub fn allow_only_none() -> Self {
        Self::permit(["none"])
    }

    pub fn kind(&self) -> ConstraintType {
        self.kind
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Whether `id` passes these constraints.
    pub fn allows(&self, id: &str) -> bool {
        let listed = self.ids.contains(id);
        match self.kind {
            ConstraintType::Permit => listed,
            ConstraintType::Block => !listed,
        }
    }

    /// Fail with [`ErrorKind::AlgorithmConstraintViolation`] if `id` is not allowed.
    ///
    /// The error wraps a [`ConstraintViolation`] naming the id and the active policy.
    pub fn check(&self, id: &str) -> Result<(), JoseError> {
        if self.allows(id) {
            return Ok(());
        }
        tracing::debug!(algorithm = id, constraints = %self, "algorithm rejected by constraints");
        Err(JoseError::new(
            ErrorKind::AlgorithmConstraintViolation,
            ConstraintViolation {
                algorithm: id.to_owned(),
                constraints: self.clone(),
            },
        ))
    }
}

impl Default for AlgorithmConstraints {
    fn default() -> Self {
        Self::no_constraints()
    }
}

impl fmt::Display for AlgorithmConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ConstraintType::Permit => "PERMIT",
            ConstraintType::Block => "BLOCK",
        };
        write!(f, "{kind} [")?;
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(id)?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, Clone)]
/// Details of a rejected algorithm.
pub struct ConstraintViolation {
    algorithm: String,
    constraints: AlgorithmConstraints,
}

impl ConstraintViolation {
    /// The rejected identifier.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The policy that rejected it.
    pub fn constraints(&self) -> &AlgorithmConstraints {
        &self.constraints
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' is not allowed by algorithm constraints {}",
            self.algorithm, self.constraints
        )
    }
}

impl std::error::Error for ConstraintViolation {}
