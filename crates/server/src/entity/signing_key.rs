//! Signing key entity - RSA keypairs used to sign issued JWTs.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "signing_keys")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub kid: String,
    /// PKCS#1 or PKCS#8 PEM
    #[serde(skip_serializing)]
    pub private_key_pem: String,
    /// SPKI or PKCS#1 PEM
    pub public_key_pem: String,
    /// Exactly one row is expected to carry this flag.
    pub active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
