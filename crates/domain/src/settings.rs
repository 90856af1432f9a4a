use std::{collections::HashMap, env};

use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Per-user settings row, keyed by `user_id`
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct UserSettings {
    pub user_id: String,
    #[serde(default)]
    pub mapbox_token: Option<String>,
}

impl UserSettings {
    pub fn with_token(user_id: impl Into<String>, token: &str) -> Result<Self, Error> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::validation("Please enter your Mapbox token"));
        }
        Ok(Self {
            user_id: user_id.into(),
            mapbox_token: Some(token.to_string()),
        })
    }
}

#[derive(Clone)]
pub struct SettingsRepo {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl SettingsRepo {
    pub fn new(client: aws_sdk_dynamodb::Client) -> Self {
        let table = env::var("DYNAMODB_USER_SETTINGS_TABLE")
            .unwrap_or("medpal-user-settings".to_string());
        Self { client, table }
    }

    pub async fn load(&self, user_id: &str) -> Result<Option<UserSettings>, Error> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("user_id", AttributeValue::S(user_id.to_string()))
            .send()
            .await
            .map_err(Error::storage)?;

        output
            .item
            .map(|item| serde_dynamo::from_item::<_, UserSettings>(item))
            .transpose()
            .map_err(Error::storage)
    }

    /// Insert or replace the row for `settings.user_id`
    pub async fn upsert(&self, settings: &UserSettings) -> Result<(), Error> {
        let item: HashMap<String, AttributeValue> =
            serde_dynamo::to_item(settings).map_err(Error::storage)?;

        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(Error::storage)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_trimmed_and_required() {
        let settings = UserSettings::with_token("user-1", "  pk.abc  ").unwrap();
        assert_eq!(settings.mapbox_token.as_deref(), Some("pk.abc"));

        assert!(UserSettings::with_token("user-1", "   ").is_err());
    }
}
