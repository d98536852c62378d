use serde::{Deserialize, Serialize};

use super::marshal::{MarshalReader, MarshalWriter, Marshalable};
use crate::{
    error::KometError,
    identifier::Nid,
    metadata::{CORE_MODULE, MASTER_PATH, USER},
    stamp::{Stamp, Status},
};

/// Who is editing and where new versions go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EditCoordinate {
    pub author: Nid,
    /// Module for new content.
    pub default_module: Nid,
    /// Module content is moved into on promotion.
    pub destination_module: Nid,
    pub promotion_path: Nid,
}

impl Default for EditCoordinate {
    fn default() -> Self {
        EditCoordinate {
            author: USER.nid,
            default_module: CORE_MODULE.nid,
            destination_module: CORE_MODULE.nid,
            promotion_path: MASTER_PATH.nid,
        }
    }
}

impl EditCoordinate {
    pub fn new(author: Nid, default_module: Nid, destination_module: Nid, promotion_path: Nid) -> Self {
        EditCoordinate {
            author,
            default_module,
            destination_module,
            promotion_path,
        }
    }

    pub fn with_author(&self, author: Nid) -> Self {
        EditCoordinate { author, ..*self }
    }

    /// An uncommitted stamp for new content on `path`.
    pub fn uncommitted_stamp(&self, status: Status, path: Nid) -> Result<Stamp, KometError> {
        Stamp::uncommitted(status, self.author, self.default_module, path)
    }

    /// An uncommitted stamp for content being promoted.
    pub fn promotion_stamp(&self, status: Status) -> Result<Stamp, KometError> {
        Stamp::uncommitted(status, self.author, self.destination_module, self.promotion_path)
    }
}

impl Marshalable for EditCoordinate {
    const RECORD: &'static str = "edit coordinate";

    fn write_fields(&self, version: u32, out: &mut MarshalWriter) -> Result<(), KometError> {
        out.put_nid(self.author);
        out.put_nid(self.default_module);
        out.put_nid(self.promotion_path);
        if version >= 2 {
            out.put_nid(self.destination_module);
        }
        Ok(())
    }

    fn read_fields(version: u32, input: &mut MarshalReader) -> Result<Self, KometError> {
        let author = input.get_nid()?;
        let default_module = input.get_nid()?;
        let promotion_path = input.get_nid()?;
        let destination_module = if version >= 2 {
            input.get_nid()?
        } else {
            default_module
        };
        Ok(EditCoordinate::new(
            author,
            default_module,
            destination_module,
            promotion_path,
        ))
    }
}
