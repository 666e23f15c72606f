use crate::error::Error;

/// Defines the various families of sketch and set operation classes.
///
/// A family defines a set of classes that share fundamental algorithms and
/// behaviors. The classes within a family may still differ by how they are
/// stored and accessed.
pub(crate) struct Family {
    /// The byte ID for this family.
    pub id: u8,
    /// The name for this family.
    pub name: &'static str,
    /// The minimum preamble size for this family in longs (8-byte words).
    pub min_pre_longs: u8,
    /// The maximum preamble size for this family in longs (8-byte words).
    pub max_pre_longs: u8,
}

impl Family {
    /// Theta sketches for cardinality estimation.
    pub const THETA: Family = Family {
        id: 3,
        name: "THETA",
        min_pre_longs: 1,
        max_pre_longs: 3,
    };

    /// Doubles quantiles sketches for rank and quantile estimation.
    pub const QUANTILES: Family = Family {
        id: 8,
        name: "QUANTILES",
        min_pre_longs: 1,
        max_pre_longs: 2,
    };

    /// VarOpt weighted reservoir sampling sketches.
    pub const VAROPT: Family = Family {
        id: 13,
        name: "VAROPT",
        min_pre_longs: 1,
        max_pre_longs: 4,
    };
}

impl Family {
    pub fn validate_id(&self, family_id: u8) -> Result<(), Error> {
        if family_id != self.id {
            Err(Error::invalid_family(self.id, family_id, self.name))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_matching_id() {
        assert!(Family::THETA.validate_id(3).is_ok());
        assert!(Family::THETA.validate_id(9).is_err());
    }
}
