//! ABAC rule definitions.

use serde::{Deserialize, Serialize};
use veil_types::ItemId;

/// One attribute rule for an output item.
///
/// The item is granted when the subject carries `subject_attribute`, the
/// environment carries `environment_attribute` and the item's object
/// attributes contain `object_attribute`. An empty requirement places no
/// constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbacRule {
    pub item: ItemId,
    pub subject_attribute: String,
    pub object_attribute: String,
    #[serde(default)]
    pub environment_attribute: String,
}

impl AbacRule {
    pub fn new(
        item: impl Into<ItemId>,
        subject_attribute: impl Into<String>,
        object_attribute: impl Into<String>,
        environment_attribute: impl Into<String>,
    ) -> Self {
        Self {
            item: item.into(),
            subject_attribute: subject_attribute.into(),
            object_attribute: object_attribute.into(),
            environment_attribute: environment_attribute.into(),
        }
    }
}
