//! Adapters keyed on the organisation number: the official registry, filed
//! annual accounts, the credit registry and the secondary company directory.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::SourceError;
use crate::models::{
    AnnualFiling, AnnualReportsRecord, CompanyIdentifier, CreditRecord, RegistryRecord,
    SecondaryRegistryRecord, SourceKind, SourceRecord,
};
use crate::sources::{get_json, get_text, SourceAdapter};
use crate::web_sources::json_ld_objects;

// ============ Official registry ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrregEnhet {
    organisasjonsnummer: Option<String>,
    navn: Option<String>,
    organisasjonsform: Option<BrregKode>,
    registreringsdato_enhetsregisteret: Option<NaiveDate>,
    stiftelsesdato: Option<NaiveDate>,
    forretningsadresse: Option<BrregAdresse>,
    postadresse: Option<BrregAdresse>,
    naeringskode1: Option<BrregKode>,
    antall_ansatte: Option<u32>,
    hjemmeside: Option<String>,
    konkurs: Option<bool>,
    under_avvikling: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct BrregKode {
    kode: Option<String>,
    beskrivelse: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BrregAdresse {
    #[serde(default)]
    adresse: Vec<String>,
    postnummer: Option<String>,
    poststed: Option<String>,
}

impl From<BrregEnhet> for RegistryRecord {
    fn from(e: BrregEnhet) -> Self {
        let address = e.forretningsadresse.or(e.postadresse);
        let (street, postal_code, city) = match address {
            Some(a) => {
                let street = a
                    .adresse
                    .iter()
                    .map(|l| l.trim())
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                (
                    (!street.is_empty()).then_some(street),
                    a.postnummer,
                    a.poststed,
                )
            }
            None => (None, None, None),
        };
        let (industry_code, industry_description) = match e.naeringskode1 {
            Some(k) => (k.kode, k.beskrivelse),
            None => (None, None),
        };

        RegistryRecord {
            name: e.navn,
            org_number: e.organisasjonsnummer,
            org_form: e.organisasjonsform.and_then(|f| f.kode),
            registration_date: e.registreringsdato_enhetsregisteret,
            founded_date: e.stiftelsesdato,
            address: street,
            postal_code,
            city,
            industry_code,
            industry_description,
            employees: e.antall_ansatte,
            website: e.hjemmeside,
            bankrupt: e.konkurs,
            under_liquidation: e.under_avvikling,
        }
    }
}

/// Enhetsregisteret lookup by organisation number.
pub struct RegistryAdapter {
    client: Client,
    base_url: String,
}

impl RegistryAdapter {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for RegistryAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Registry
    }

    fn applies(&self, identifier: &CompanyIdentifier) -> bool {
        identifier.normalized_org_number().is_some()
    }

    async fn fetch(
        &self,
        identifier: &CompanyIdentifier,
    ) -> Result<Option<SourceRecord>, SourceError> {
        let Some(org) = identifier.normalized_org_number() else {
            return Ok(None);
        };
        let url = format!("{}/enhetsregisteret/api/enheter/{}", self.base_url, org);
        tracing::info!("Fetching registry entry for {}", org);

        let enhet: Option<BrregEnhet> = get_json(&self.client, &url, None).await?;
        Ok(enhet.map(|e| SourceRecord::Registry(e.into())))
    }
}

// ============ Annual accounts ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Regnskap {
    regnskapsperiode: Option<Periode>,
    resultatregnskap_resultat: Option<Resultat>,
    eiendeler: Option<Eiendeler>,
    egenkapital_gjeld: Option<EgenkapitalGjeld>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Periode {
    til_dato: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct Resultat {
    driftsresultat: Option<Driftsresultat>,
    aarsresultat: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Driftsresultat {
    driftsinntekter: Option<Driftsinntekter>,
    driftsresultat: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Driftsinntekter {
    sum_driftsinntekter: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Eiendeler {
    sum_eiendeler: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EgenkapitalGjeld {
    egenkapital: Option<Egenkapital>,
    gjeld_oversikt: Option<GjeldOversikt>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Egenkapital {
    sum_egenkapital: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GjeldOversikt {
    sum_gjeld: Option<f64>,
}

impl Regnskap {
    fn into_filing(self) -> Option<AnnualFiling> {
        let year = self.regnskapsperiode?.til_dato?.year();
        let (revenue, operating_result, net_result) = match self.resultatregnskap_resultat {
            Some(r) => {
                let (revenue, operating) = match r.driftsresultat {
                    Some(d) => (
                        d.driftsinntekter.and_then(|i| i.sum_driftsinntekter),
                        d.driftsresultat,
                    ),
                    None => (None, None),
                };
                (revenue, operating, r.aarsresultat)
            }
            None => (None, None, None),
        };
        let (equity, total_debt) = match self.egenkapital_gjeld {
            Some(eg) => (
                eg.egenkapital.and_then(|e| e.sum_egenkapital),
                eg.gjeld_oversikt.and_then(|g| g.sum_gjeld),
            ),
            None => (None, None),
        };

        Some(AnnualFiling {
            year,
            revenue,
            operating_result,
            net_result,
            total_assets: self.eiendeler.and_then(|e| e.sum_eiendeler),
            equity,
            total_debt,
        })
    }
}

/// Regnskapsregisteret filings by organisation number.
pub struct AnnualReportsAdapter {
    client: Client,
    base_url: String,
}

impl AnnualReportsAdapter {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for AnnualReportsAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::AnnualReports
    }

    fn applies(&self, identifier: &CompanyIdentifier) -> bool {
        identifier.normalized_org_number().is_some()
    }

    async fn fetch(
        &self,
        identifier: &CompanyIdentifier,
    ) -> Result<Option<SourceRecord>, SourceError> {
        let Some(org) = identifier.normalized_org_number() else {
            return Ok(None);
        };
        let url = format!("{}/regnskapsregisteret/regnskap/{}", self.base_url, org);
        tracing::info!("Fetching annual accounts for {}", org);

        let Some(reports) = get_json::<Vec<Regnskap>>(&self.client, &url, None).await? else {
            return Ok(None);
        };

        let mut filings: Vec<AnnualFiling> =
            reports.into_iter().filter_map(Regnskap::into_filing).collect();
        filings.sort_by_key(|f| f.year);
        filings.dedup_by_key(|f| f.year);

        if filings.is_empty() {
            return Ok(None);
        }
        Ok(Some(SourceRecord::AnnualReports(AnnualReportsRecord {
            filings,
        })))
    }
}

// ============ Credit registry ============

/// Paid credit registry. Inactive unless both URL and key are configured.
pub struct CreditAdapter {
    client: Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl CreditAdapter {
    pub fn new(client: Client, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
        }
    }
}

#[async_trait]
impl SourceAdapter for CreditAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Credit
    }

    fn applies(&self, identifier: &CompanyIdentifier) -> bool {
        self.base_url.is_some()
            && self.api_key.is_some()
            && identifier.normalized_org_number().is_some()
    }

    async fn fetch(
        &self,
        identifier: &CompanyIdentifier,
    ) -> Result<Option<SourceRecord>, SourceError> {
        let (Some(base_url), Some(api_key), Some(org)) = (
            self.base_url.as_deref(),
            self.api_key.as_deref(),
            identifier.normalized_org_number(),
        ) else {
            return Ok(None);
        };
        let url = format!("{}/companies/{}", base_url, org);
        tracing::info!("Fetching credit data for {}", org);

        let record: Option<CreditRecord> = get_json(&self.client, &url, Some(api_key)).await?;
        Ok(record.map(SourceRecord::Credit))
    }
}

// ============ Secondary directory ============

/// Reads the schema.org `Organization` block of a company directory page.
pub fn parse_secondary_registry(html: &str) -> Option<SecondaryRegistryRecord> {
    let org = json_ld_objects(html)
        .into_iter()
        .find(|v| type_is(v, "Organization") || type_is(v, "Corporation"))?;

    let employees = match org.get("numberOfEmployees") {
        Some(Value::Object(q)) => q.get("value").and_then(number_like),
        Some(v) => number_like(v),
        None => None,
    }
    .map(|n| n as u32);

    let founded_year = org
        .get("foundingDate")
        .and_then(Value::as_str)
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse().ok());

    let address = match org.get("address") {
        Some(Value::Object(a)) => {
            let parts: Vec<&str> = ["streetAddress", "postalCode", "addressLocality"]
                .iter()
                .filter_map(|k| a.get(*k).and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Some(Value::String(s)) => Some(s.trim().to_string()),
        _ => None,
    };

    let record = SecondaryRegistryRecord {
        name: string_field(&org, "name"),
        employees,
        founded_year,
        address,
        description: string_field(&org, "description"),
    };
    (record != SecondaryRegistryRecord::default()).then_some(record)
}

pub(crate) fn type_is(value: &Value, wanted: &str) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == wanted,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(wanted)),
        _ => false,
    }
}

pub(crate) fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace([' ', ','], "").parse().ok(),
        _ => None,
    }
    .filter(|n: &f64| n.is_finite() && *n >= 0.0)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub struct SecondaryRegistryAdapter {
    client: Client,
    base_url: String,
}

impl SecondaryRegistryAdapter {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for SecondaryRegistryAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::SecondaryRegistry
    }

    fn applies(&self, identifier: &CompanyIdentifier) -> bool {
        identifier.normalized_org_number().is_some()
    }

    async fn fetch(
        &self,
        identifier: &CompanyIdentifier,
    ) -> Result<Option<SourceRecord>, SourceError> {
        let Some(org) = identifier.normalized_org_number() else {
            return Ok(None);
        };
        let url = format!("{}/{}", self.base_url, org);

        let Some(html) = get_text(&self.client, &url, None).await? else {
            return Ok(None);
        };
        Ok(parse_secondary_registry(&html).map(SourceRecord::SecondaryRegistry))
    }
}
