//! OAuth client entity - the flat registry of relying parties.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_clients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub client_id: String,
    /// The single registered redirect URI, compared by exact string equality.
    pub redirect_uri: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Exact match only. No prefix, path or case normalisation is applied.
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uri == uri
    }
}
