//! Industry-keyed lookup tables shared by enrichment backfill and both
//! valuation paths.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    Tech,
    Ecommerce,
    Consulting,
    Manufacturing,
    Retail,
    Services,
    Construction,
    Healthcare,
    Restaurant,
    Other,
}

/// Qualitative text used when no source describes the company.
#[derive(Debug, Clone, Copy)]
pub struct IndustryDefaults {
    pub description: &'static str,
    pub customer_base: &'static str,
    pub competitive_advantage: &'static str,
    pub growth_potential: &'static str,
    pub key_risks: &'static str,
}

impl Industry {
    pub const ALL: [Industry; 10] = [
        Industry::Tech,
        Industry::Ecommerce,
        Industry::Consulting,
        Industry::Manufacturing,
        Industry::Retail,
        Industry::Services,
        Industry::Construction,
        Industry::Healthcare,
        Industry::Restaurant,
        Industry::Other,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Industry::Tech => "tech",
            Industry::Ecommerce => "ecommerce",
            Industry::Consulting => "consulting",
            Industry::Manufacturing => "manufacturing",
            Industry::Retail => "retail",
            Industry::Services => "services",
            Industry::Construction => "construction",
            Industry::Healthcare => "healthcare",
            Industry::Restaurant => "restaurant",
            Industry::Other => "other",
        }
    }

    /// Parses a user-facing key, accepting a few common aliases.
    pub fn parse(raw: &str) -> Option<Industry> {
        let key = raw.trim().to_lowercase().replace(['-', ' '], "_");
        let industry = match key.as_str() {
            "tech" | "technology" | "it" | "software" | "saas" => Industry::Tech,
            "ecommerce" | "e_commerce" | "netthandel" => Industry::Ecommerce,
            "consulting" | "consultancy" | "radgivning" => Industry::Consulting,
            "manufacturing" | "production" | "industri" => Industry::Manufacturing,
            "retail" | "handel" => Industry::Retail,
            "services" | "service" | "tjenester" => Industry::Services,
            "construction" | "bygg" | "bygg_og_anlegg" => Industry::Construction,
            "healthcare" | "health" | "helse" => Industry::Healthcare,
            "restaurant" | "hospitality" | "servering" => Industry::Restaurant,
            "other" | "annet" => Industry::Other,
            _ => return None,
        };
        Some(industry)
    }

    /// Maps a NACE code such as `62.010` to an industry.
    pub fn from_nace(code: &str) -> Industry {
        if code.trim().starts_with("47.91") {
            return Industry::Ecommerce;
        }
        let division: u32 = code
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .unwrap_or(0);
        match division {
            58 | 62 | 63 => Industry::Tech,
            69 | 70 | 71 | 73 | 74 => Industry::Consulting,
            10..=33 => Industry::Manufacturing,
            41..=43 => Industry::Construction,
            45..=47 => Industry::Retail,
            55 | 56 => Industry::Restaurant,
            75 | 86..=88 => Industry::Healthcare,
            49..=53 | 68 | 77..=82 | 85 | 90..=96 => Industry::Services,
            _ => Industry::Other,
        }
    }

    /// EV/EBITDA base multiple.
    pub fn ebitda_multiple(&self) -> f64 {
        match self {
            Industry::Tech => 8.0,
            Industry::Ecommerce => 6.0,
            Industry::Consulting => 5.0,
            Industry::Manufacturing => 5.5,
            Industry::Retail => 4.0,
            Industry::Services => 4.5,
            Industry::Construction => 4.0,
            Industry::Healthcare => 7.0,
            Industry::Restaurant => 3.5,
            Industry::Other => 4.5,
        }
    }

    /// EV/Revenue multiple.
    pub fn revenue_multiple(&self) -> f64 {
        match self {
            Industry::Tech => 2.0,
            Industry::Ecommerce => 1.0,
            Industry::Consulting => 0.8,
            Industry::Manufacturing => 0.7,
            Industry::Retail => 0.4,
            Industry::Services => 0.8,
            Industry::Construction => 0.5,
            Industry::Healthcare => 1.2,
            Industry::Restaurant => 0.5,
            Industry::Other => 0.7,
        }
    }

    /// EBITDA margin assumed when the user gives neither costs nor a margin bucket.
    pub fn typical_margin(&self) -> f64 {
        match self {
            Industry::Tech => 0.15,
            Industry::Ecommerce => 0.08,
            Industry::Consulting => 0.12,
            Industry::Manufacturing => 0.10,
            Industry::Retail => 0.05,
            Industry::Services => 0.10,
            Industry::Construction => 0.07,
            Industry::Healthcare => 0.12,
            Industry::Restaurant => 0.06,
            Industry::Other => 0.08,
        }
    }

    /// Net working capital as a share of revenue for a healthy company.
    pub fn expected_working_capital_ratio(&self) -> f64 {
        match self {
            Industry::Tech => 0.10,
            Industry::Ecommerce => 0.15,
            Industry::Consulting => 0.12,
            Industry::Manufacturing => 0.20,
            Industry::Retail => 0.12,
            Industry::Services => 0.10,
            Industry::Construction => 0.15,
            Industry::Healthcare => 0.12,
            Industry::Restaurant => 0.05,
            Industry::Other => 0.12,
        }
    }

    pub fn defaults(&self) -> IndustryDefaults {
        match self {
            Industry::Tech => IndustryDefaults {
                description: "Technology company delivering software and digital services",
                customer_base: "Business customers on recurring contracts",
                competitive_advantage: "Proprietary technology and technical expertise",
                growth_potential: "High, driven by digitalisation and scalable delivery",
                key_risks: "Key-person dependency and fast technology shifts",
            },
            Industry::Ecommerce => IndustryDefaults {
                description: "Online retailer selling directly to consumers",
                customer_base: "Broad consumer base acquired through digital channels",
                competitive_advantage: "Brand, product range and logistics",
                growth_potential: "Moderate to high as online share of retail grows",
                key_risks: "Marketing cost inflation and international competition",
            },
            Industry::Consulting => IndustryDefaults {
                description: "Advisory firm selling expert hours and projects",
                customer_base: "Long-standing business and public-sector clients",
                competitive_advantage: "Specialist competence and client relationships",
                growth_potential: "Moderate, tied to hiring capacity",
                key_risks: "Dependence on partners and a few large clients",
            },
            Industry::Manufacturing => IndustryDefaults {
                description: "Producer of physical goods with own production facilities",
                customer_base: "Industrial customers and distributors",
                competitive_advantage: "Production know-how and installed equipment",
                growth_potential: "Moderate, capital-intensive expansion",
                key_risks: "Raw-material prices and capacity utilisation",
            },
            Industry::Retail => IndustryDefaults {
                description: "Physical retail business",
                customer_base: "Local walk-in consumers",
                competitive_advantage: "Location and customer loyalty",
                growth_potential: "Low to moderate",
                key_risks: "Lease obligations and online competition",
            },
            Industry::Services => IndustryDefaults {
                description: "Service provider to businesses and households",
                customer_base: "Repeat local customers",
                competitive_advantage: "Reputation and reliable delivery",
                growth_potential: "Moderate",
                key_risks: "Staffing and price competition",
            },
            Industry::Construction => IndustryDefaults {
                description: "Construction and installation contractor",
                customer_base: "Developers, businesses and private homeowners",
                competitive_advantage: "Certifications and skilled workforce",
                growth_potential: "Cyclical, follows building activity",
                key_risks: "Project overruns and interest-rate sensitivity",
            },
            Industry::Healthcare => IndustryDefaults {
                description: "Private healthcare provider",
                customer_base: "Patients and public reimbursement schemes",
                competitive_advantage: "Licensed practitioners and patient trust",
                growth_potential: "Stable to high with an ageing population",
                key_risks: "Regulation and recruitment of licensed staff",
            },
            Industry::Restaurant => IndustryDefaults {
                description: "Restaurant or food-service business",
                customer_base: "Local guests and regulars",
                competitive_advantage: "Concept, location and staff",
                growth_potential: "Low to moderate",
                key_risks: "Thin margins, rent and staff turnover",
            },
            Industry::Other => IndustryDefaults {
                description: "Small or medium-sized operating company",
                customer_base: "Mixed customer base",
                competitive_advantage: "Established operations and customer relationships",
                growth_potential: "Moderate",
                key_risks: "Owner dependency and customer concentration",
            },
        }
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_aliases() {
        assert_eq!(Industry::parse("Technology"), Some(Industry::Tech));
        assert_eq!(Industry::parse("e-commerce"), Some(Industry::Ecommerce));
        assert_eq!(Industry::parse("spaceships"), None);
    }

    #[test]
    fn test_keys_round_trip() {
        for industry in Industry::ALL {
            assert_eq!(Industry::parse(industry.key()), Some(industry));
        }
    }

    #[test]
    fn test_nace_mapping() {
        assert_eq!(Industry::from_nace("62.010"), Industry::Tech);
        assert_eq!(Industry::from_nace("47.910"), Industry::Ecommerce);
        assert_eq!(Industry::from_nace("47.110"), Industry::Retail);
        assert_eq!(Industry::from_nace("43.210"), Industry::Construction);
        assert_eq!(Industry::from_nace("56.101"), Industry::Restaurant);
        assert_eq!(Industry::from_nace(""), Industry::Other);
    }
}
