use serde::{Deserialize, Serialize};

use super::{
    marshal::{MarshalReader, MarshalWriter, Marshalable},
    Premise,
};
use crate::{
    error::KometError,
    identifier::Nid,
    metadata::{
        CONCEPT_ASSEMBLAGE, EL_PLUS_PLUS_INFERRED_ASSEMBLAGE, EL_PLUS_PLUS_PROFILE,
        EL_PLUS_PLUS_STATED_ASSEMBLAGE, ROOT_CONCEPT, STRUCTURAL_CLASSIFIER,
    },
};

/// Where stated and inferred logic graphs live, and which profile and classifier govern
/// reasoning over them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicCoordinate {
    pub stated_assemblage: Nid,
    pub inferred_assemblage: Nid,
    pub profile: Nid,
    pub classifier: Nid,
    pub concept_assemblage: Nid,
    pub root: Nid,
}

impl Default for LogicCoordinate {
    fn default() -> Self {
        Self::el_plus_plus()
    }
}

impl LogicCoordinate {
    pub fn el_plus_plus() -> Self {
        LogicCoordinate {
            stated_assemblage: EL_PLUS_PLUS_STATED_ASSEMBLAGE.nid,
            inferred_assemblage: EL_PLUS_PLUS_INFERRED_ASSEMBLAGE.nid,
            profile: EL_PLUS_PLUS_PROFILE.nid,
            classifier: STRUCTURAL_CLASSIFIER.nid,
            concept_assemblage: CONCEPT_ASSEMBLAGE.nid,
            root: ROOT_CONCEPT.nid,
        }
    }

    pub fn assemblage_for(&self, premise: Premise) -> Nid {
        match premise {
            Premise::Stated => self.stated_assemblage,
            Premise::Inferred => self.inferred_assemblage,
        }
    }

    pub fn premise_of(&self, assemblage: Nid) -> Option<Premise> {
        if assemblage == self.stated_assemblage {
            Some(Premise::Stated)
        } else if assemblage == self.inferred_assemblage {
            Some(Premise::Inferred)
        } else {
            None
        }
    }

    pub fn is_logic_assemblage(&self, assemblage: Nid) -> bool {
        self.premise_of(assemblage).is_some()
    }

    fn validate(&self) -> Result<(), KometError> {
        if self.stated_assemblage == self.inferred_assemblage {
            return Err(KometError::Configuration(
                "Stated and inferred logic graphs must live in different assemblages".to_string(),
            ));
        }
        Ok(())
    }
}

impl Marshalable for LogicCoordinate {
    const RECORD: &'static str = "logic coordinate";

    fn write_fields(&self, version: u32, out: &mut MarshalWriter) -> Result<(), KometError> {
        out.put_nid(self.stated_assemblage);
        out.put_nid(self.inferred_assemblage);
        out.put_nid(self.profile);
        out.put_nid(self.classifier);
        out.put_nid(self.concept_assemblage);
        if version >= 2 {
            out.put_nid(self.root);
        }
        Ok(())
    }

    fn read_fields(version: u32, input: &mut MarshalReader) -> Result<Self, KometError> {
        let coordinate = LogicCoordinate {
            stated_assemblage: input.get_nid()?,
            inferred_assemblage: input.get_nid()?,
            profile: input.get_nid()?,
            classifier: input.get_nid()?,
            concept_assemblage: input.get_nid()?,
            root: if version >= 2 {
                input.get_nid()?
            } else {
                ROOT_CONCEPT.nid
            },
        };
        coordinate.validate()?;
        Ok(coordinate)
    }
}
