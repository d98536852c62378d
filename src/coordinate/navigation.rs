use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{
    marshal::{MarshalReader, MarshalWriter, Marshalable},
    LogicCoordinate, Premise,
};
use crate::{error::KometError, identifier::Nid, metadata::IS_A};

/// Which logic graph assemblages are walked to build parent/child edges, and which
/// relationship types count as taxonomy edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NavigationCoordinate {
    navigation_assemblages: BTreeSet<Nid>,
    taxonomy_types: BTreeSet<Nid>,
}

impl NavigationCoordinate {
    pub fn new(
        navigation_assemblages: BTreeSet<Nid>,
        taxonomy_types: BTreeSet<Nid>,
    ) -> Result<Self, KometError> {
        if navigation_assemblages.is_empty() {
            return Err(KometError::Configuration(
                "Navigation coordinate has no assemblage to navigate".to_string(),
            ));
        }
        if taxonomy_types.is_empty() {
            return Err(KometError::Configuration(
                "Navigation coordinate has no taxonomy relationship type".to_string(),
            ));
        }
        Ok(NavigationCoordinate {
            navigation_assemblages,
            taxonomy_types,
        })
    }

    pub fn for_premise(premise: Premise, logic: &LogicCoordinate) -> Self {
        NavigationCoordinate {
            navigation_assemblages: BTreeSet::from([logic.assemblage_for(premise)]),
            taxonomy_types: BTreeSet::from([IS_A.nid]),
        }
    }

    pub fn stated(logic: &LogicCoordinate) -> Self {
        Self::for_premise(Premise::Stated, logic)
    }

    pub fn inferred(logic: &LogicCoordinate) -> Self {
        Self::for_premise(Premise::Inferred, logic)
    }

    pub fn navigation_assemblages(&self) -> &BTreeSet<Nid> {
        &self.navigation_assemblages
    }

    pub fn taxonomy_types(&self) -> &BTreeSet<Nid> {
        &self.taxonomy_types
    }

    pub fn navigates(&self, assemblage: Nid) -> bool {
        self.navigation_assemblages.contains(&assemblage)
    }

    pub fn with_taxonomy_types(&self, types: BTreeSet<Nid>) -> Result<Self, KometError> {
        NavigationCoordinate::new(self.navigation_assemblages.clone(), types)
    }

    /// The single premise navigated, if the assemblages are exactly one side of `logic`.
    pub fn premise(&self, logic: &LogicCoordinate) -> Option<Premise> {
        let mut premises = self
            .navigation_assemblages
            .iter()
            .map(|a| logic.premise_of(*a));
        let first = premises.next().flatten()?;
        premises.all(|p| p == Some(first)).then_some(first)
    }
}

impl Marshalable for NavigationCoordinate {
    const RECORD: &'static str = "navigation coordinate";

    fn write_fields(&self, version: u32, out: &mut MarshalWriter) -> Result<(), KometError> {
        out.put_nid_set(&self.navigation_assemblages);
        if version >= 2 {
            out.put_nid_set(&self.taxonomy_types);
        }
        Ok(())
    }

    fn read_fields(version: u32, input: &mut MarshalReader) -> Result<Self, KometError> {
        let assemblages = input.get_nid_set()?;
        let types = if version >= 2 {
            input.get_nid_set()?
        } else {
            BTreeSet::from([IS_A.nid])
        };
        NavigationCoordinate::new(assemblages, types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_premise() {
        let logic = LogicCoordinate::el_plus_plus();
        assert_eq!(
            NavigationCoordinate::inferred(&logic).premise(&logic),
            Some(Premise::Inferred)
        );
        let both = NavigationCoordinate::new(
            BTreeSet::from([logic.stated_assemblage, logic.inferred_assemblage]),
            BTreeSet::from([IS_A.nid]),
        )
        .unwrap();
        assert_eq!(both.premise(&logic), None);
    }
}
