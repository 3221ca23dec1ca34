use serde::Deserialize;

/// Raw submission fields as they arrive from the HTML form or the JSON
/// API. Everything is optional text at this stage; `donations::validate`
/// decides what is acceptable and builds the structured record that is
/// allowed to reach storage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DonationInput {
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub message: Option<String>,
}

/// JSON API request body. The form sends text for every field; JSON
/// clients usually send the amount as a number, so it is accepted both
/// ways and normalized before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct DonationPayload {
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub amount: Option<RawAmount>,
    pub currency: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

impl RawAmount {
    pub fn into_text(self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Text(text) => text,
        }
    }
}

impl DonationPayload {
    pub fn into_input(self) -> DonationInput {
        DonationInput {
            donor_name: self.donor_name,
            donor_email: self.donor_email,
            amount: self.amount.map(RawAmount::into_text),
            currency: self.currency,
            message: self.message,
        }
    }
}
