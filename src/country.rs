//! Country normalization and allow/deny policy.
//!
//! Listing pages label endpoints with free-text country names ("Japan",
//! "Russian Federation", "Korea, Republic of"). This module maps those names
//! to ISO 3166-1 alpha-2 codes and evaluates the user's country policy.
//!
//! # Policy Syntax
//!
//! A policy is a comma-separated list of tokens, case-insensitive. Each token is
//! a country code or name; a leading `!` puts it on the deny list and `*` turns
//! the allow list into "any country".
//!
//! | Policy | Meaning |
//! |------|---------|
//! | `!RU` | anything except Russia (the default) |
//! | `US,jp` | only the USA or Japan |
//! | `US,jp,!RU` | USA or Japan, never Russia |
//! | `*` | any country |
//! | `*,!de` | any country except Germany |
//!
//! # Evaluation
//!
//! ```text
//! passes = (allow is * OR allow empty OR code ∈ allow)
//!      AND (deny empty OR code ∉ deny)
//! ```
//!
//! A name that cannot be resolved to a code fails every check that needs a
//! code, so it only passes an unrestricted policy.
//!
//! # Example
//!
//! ```rust
//! use ovpn_scout::country::{CountryPolicy, StaticCountryTable};
//!
//! let table = StaticCountryTable;
//! let policy = CountryPolicy::parse("US,!RU", &table).unwrap();
//!
//! assert!(policy.allows_name("United States", &table));
//! assert!(!policy.allows_name("Germany", &table));
//! assert!(!policy.allows_name("Russian Federation", &table));
//! ```

use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// Validates that a string is a valid 2-character country code.
///
/// Country codes must be exactly 2 alphabetic characters (case-insensitive).
///
/// ```rust
/// use ovpn_scout::country::is_valid_country_code;
///
/// assert!(is_valid_country_code("US"));
/// assert!(is_valid_country_code("de"));
/// assert!(!is_valid_country_code("USA"));
/// assert!(!is_valid_country_code("U1"));
/// ```
pub fn is_valid_country_code(s: &str) -> bool {
    s.len() == 2 && s.chars().all(|c| c.is_ascii_alphabetic())
}

/// Capability that resolves free-text country names to alpha-2 codes.
///
/// Implementations return upper-case codes. The built-in
/// [`StaticCountryTable`] covers ISO 3166-1; tests substitute small tables.
pub trait CountryLookup: Send + Sync {
    /// Returns the alpha-2 code for `name`, or `None` if it is unknown.
    fn normalize(&self, name: &str) -> Option<String>;
}

/// ISO 3166-1 lookup table compiled into the binary.
///
/// Matches alpha-2 codes, alpha-3 codes, the short name and a handful of
/// official and common names, all case-insensitively.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCountryTable;

impl CountryLookup for StaticCountryTable {
    fn normalize(&self, name: &str) -> Option<String> {
        let needle = name.trim();
        if needle.is_empty() {
            return None;
        }
        COUNTRIES
            .iter()
            .find(|(alpha2, alpha3, names)| {
                alpha2.eq_ignore_ascii_case(needle)
                    || alpha3.eq_ignore_ascii_case(needle)
                    || names.iter().any(|n| n.eq_ignore_ascii_case(needle))
            })
            .map(|(alpha2, _, _)| (*alpha2).to_string())
    }
}

/// Which countries the allow side of a policy admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    /// `*` was given: the allow side admits everything.
    Any,
    /// Only these upper-case codes. Empty means "not restricted".
    Codes(BTreeSet<String>),
}

/// A parsed country allow/deny policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryPolicy {
    /// Allow side.
    pub allow: AllowList,
    /// Upper-case codes that are always rejected.
    pub deny: BTreeSet<String>,
}

impl Default for CountryPolicy {
    /// The default policy, equivalent to `!RU`.
    fn default() -> Self {
        Self {
            allow: AllowList::Codes(BTreeSet::new()),
            deny: BTreeSet::from(["RU".to_string()]),
        }
    }
}

impl CountryPolicy {
    /// Parses a comma-separated policy specification.
    ///
    /// Blank tokens are ignored. Each remaining token is resolved through
    /// `lookup`; a bare two-letter token the table does not know is still
    /// accepted as a code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a token that is neither a known country
    /// nor a two-letter code, or for a negated wildcard (`!*`).
    pub fn parse(spec: &str, lookup: &dyn CountryLookup) -> Result<Self> {
        let mut any = false;
        let mut allow = BTreeSet::new();
        let mut deny = BTreeSet::new();

        for raw in spec.split(',') {
            let token = raw.trim();
            if token.is_empty() {
                continue;
            }
            if let Some(negated) = token.strip_prefix('!') {
                let negated = negated.trim();
                if negated == "*" {
                    return Err(Error::Config("cannot deny every country (!*)".to_string()));
                }
                deny.insert(resolve_token(negated, lookup)?);
            } else if token == "*" {
                any = true;
            } else {
                allow.insert(resolve_token(token, lookup)?);
            }
        }

        let allow = if any {
            AllowList::Any
        } else {
            AllowList::Codes(allow)
        };
        Ok(Self { allow, deny })
    }

    /// Returns true if no rule of this policy needs a country code.
    pub fn is_unrestricted(&self) -> bool {
        let allow_open = match &self.allow {
            AllowList::Any => true,
            AllowList::Codes(codes) => codes.is_empty(),
        };
        allow_open && self.deny.is_empty()
    }

    /// Evaluates the policy for an already-normalized code.
    pub fn allows(&self, code: Option<&str>) -> bool {
        let allowed = match &self.allow {
            AllowList::Any => true,
            AllowList::Codes(codes) if codes.is_empty() => true,
            AllowList::Codes(codes) => {
                code.is_some_and(|c| codes.contains(&c.to_ascii_uppercase()))
            }
        };
        let not_denied = self.deny.is_empty()
            || code.is_some_and(|c| !self.deny.contains(&c.to_ascii_uppercase()));
        allowed && not_denied
    }

    /// Normalizes `name` and evaluates the policy.
    pub fn allows_name(&self, name: &str, lookup: &dyn CountryLookup) -> bool {
        self.allows(lookup.normalize(name).as_deref())
    }
}

impl std::str::FromStr for CountryPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, &StaticCountryTable)
    }
}

fn resolve_token(token: &str, lookup: &dyn CountryLookup) -> Result<String> {
    if let Some(code) = lookup.normalize(token) {
        return Ok(code);
    }
    if is_valid_country_code(token) {
        return Ok(token.to_ascii_uppercase());
    }
    Err(Error::Config(format!("unknown country in policy: {}", token)))
}

/// (alpha-2, alpha-3, names)
type CountryRow = (&'static str, &'static str, &'static [&'static str]);

static COUNTRIES: &[CountryRow] = &[
    ("AD", "AND", &["Andorra"]),
    ("AE", "ARE", &["United Arab Emirates", "UAE"]),
    ("AF", "AFG", &["Afghanistan"]),
    ("AG", "ATG", &["Antigua and Barbuda"]),
    ("AI", "AIA", &["Anguilla"]),
    ("AL", "ALB", &["Albania"]),
    ("AM", "ARM", &["Armenia"]),
    ("AO", "AGO", &["Angola"]),
    ("AQ", "ATA", &["Antarctica"]),
    ("AR", "ARG", &["Argentina"]),
    ("AS", "ASM", &["American Samoa"]),
    ("AT", "AUT", &["Austria"]),
    ("AU", "AUS", &["Australia"]),
    ("AW", "ABW", &["Aruba"]),
    ("AX", "ALA", &["Åland Islands", "Aland Islands"]),
    ("AZ", "AZE", &["Azerbaijan"]),
    ("BA", "BIH", &["Bosnia and Herzegovina"]),
    ("BB", "BRB", &["Barbados"]),
    ("BD", "BGD", &["Bangladesh"]),
    ("BE", "BEL", &["Belgium"]),
    ("BF", "BFA", &["Burkina Faso"]),
    ("BG", "BGR", &["Bulgaria"]),
    ("BH", "BHR", &["Bahrain"]),
    ("BI", "BDI", &["Burundi"]),
    ("BJ", "BEN", &["Benin"]),
    ("BL", "BLM", &["Saint Barthélemy"]),
    ("BM", "BMU", &["Bermuda"]),
    ("BN", "BRN", &["Brunei Darussalam", "Brunei"]),
    ("BO", "BOL", &["Bolivia, Plurinational State of", "Bolivia"]),
    ("BQ", "BES", &["Bonaire, Sint Eustatius and Saba"]),
    ("BR", "BRA", &["Brazil"]),
    ("BS", "BHS", &["Bahamas"]),
    ("BT", "BTN", &["Bhutan"]),
    ("BW", "BWA", &["Botswana"]),
    ("BY", "BLR", &["Belarus"]),
    ("BZ", "BLZ", &["Belize"]),
    ("CA", "CAN", &["Canada"]),
    ("CC", "CCK", &["Cocos (Keeling) Islands"]),
    ("CD", "COD", &["Congo, The Democratic Republic of the", "DR Congo"]),
    ("CF", "CAF", &["Central African Republic"]),
    ("CG", "COG", &["Congo"]),
    ("CH", "CHE", &["Switzerland"]),
    ("CI", "CIV", &["Côte d'Ivoire", "Cote d'Ivoire", "Ivory Coast"]),
    ("CK", "COK", &["Cook Islands"]),
    ("CL", "CHL", &["Chile"]),
    ("CM", "CMR", &["Cameroon"]),
    ("CN", "CHN", &["China"]),
    ("CO", "COL", &["Colombia"]),
    ("CR", "CRI", &["Costa Rica"]),
    ("CU", "CUB", &["Cuba"]),
    ("CV", "CPV", &["Cabo Verde", "Cape Verde"]),
    ("CW", "CUW", &["Curaçao", "Curacao"]),
    ("CY", "CYP", &["Cyprus"]),
    ("CZ", "CZE", &["Czechia", "Czech Republic"]),
    ("DE", "DEU", &["Germany"]),
    ("DJ", "DJI", &["Djibouti"]),
    ("DK", "DNK", &["Denmark"]),
    ("DM", "DMA", &["Dominica"]),
    ("DO", "DOM", &["Dominican Republic"]),
    ("DZ", "DZA", &["Algeria"]),
    ("EC", "ECU", &["Ecuador"]),
    ("EE", "EST", &["Estonia"]),
    ("EG", "EGY", &["Egypt"]),
    ("ER", "ERI", &["Eritrea"]),
    ("ES", "ESP", &["Spain"]),
    ("ET", "ETH", &["Ethiopia"]),
    ("FI", "FIN", &["Finland"]),
    ("FJ", "FJI", &["Fiji"]),
    ("FK", "FLK", &["Falkland Islands (Malvinas)"]),
    ("FM", "FSM", &["Micronesia, Federated States of"]),
    ("FO", "FRO", &["Faroe Islands"]),
    ("FR", "FRA", &["France"]),
    ("GA", "GAB", &["Gabon"]),
    ("GB", "GBR", &["United Kingdom", "Great Britain", "UK", "England"]),
    ("GD", "GRD", &["Grenada"]),
    ("GE", "GEO", &["Georgia"]),
    ("GF", "GUF", &["French Guiana"]),
    ("GG", "GGY", &["Guernsey"]),
    ("GH", "GHA", &["Ghana"]),
    ("GI", "GIB", &["Gibraltar"]),
    ("GL", "GRL", &["Greenland"]),
    ("GM", "GMB", &["Gambia"]),
    ("GN", "GIN", &["Guinea"]),
    ("GP", "GLP", &["Guadeloupe"]),
    ("GQ", "GNQ", &["Equatorial Guinea"]),
    ("GR", "GRC", &["Greece"]),
    ("GT", "GTM", &["Guatemala"]),
    ("GU", "GUM", &["Guam"]),
    ("GW", "GNB", &["Guinea-Bissau"]),
    ("GY", "GUY", &["Guyana"]),
    ("HK", "HKG", &["Hong Kong"]),
    ("HN", "HND", &["Honduras"]),
    ("HR", "HRV", &["Croatia"]),
    ("HT", "HTI", &["Haiti"]),
    ("HU", "HUN", &["Hungary"]),
    ("ID", "IDN", &["Indonesia"]),
    ("IE", "IRL", &["Ireland"]),
    ("IL", "ISR", &["Israel"]),
    ("IM", "IMN", &["Isle of Man"]),
    ("IN", "IND", &["India"]),
    ("IQ", "IRQ", &["Iraq"]),
    ("IR", "IRN", &["Iran, Islamic Republic of", "Iran"]),
    ("IS", "ISL", &["Iceland"]),
    ("IT", "ITA", &["Italy"]),
    ("JE", "JEY", &["Jersey"]),
    ("JM", "JAM", &["Jamaica"]),
    ("JO", "JOR", &["Jordan"]),
    ("JP", "JPN", &["Japan"]),
    ("KE", "KEN", &["Kenya"]),
    ("KG", "KGZ", &["Kyrgyzstan"]),
    ("KH", "KHM", &["Cambodia"]),
    ("KI", "KIR", &["Kiribati"]),
    ("KM", "COM", &["Comoros"]),
    ("KN", "KNA", &["Saint Kitts and Nevis"]),
    ("KP", "PRK", &["Korea, Democratic People's Republic of", "North Korea"]),
    ("KR", "KOR", &["Korea, Republic of", "South Korea", "Korea"]),
    ("KW", "KWT", &["Kuwait"]),
    ("KY", "CYM", &["Cayman Islands"]),
    ("KZ", "KAZ", &["Kazakhstan"]),
    ("LA", "LAO", &["Lao People's Democratic Republic", "Laos"]),
    ("LB", "LBN", &["Lebanon"]),
    ("LC", "LCA", &["Saint Lucia"]),
    ("LI", "LIE", &["Liechtenstein"]),
    ("LK", "LKA", &["Sri Lanka"]),
    ("LR", "LBR", &["Liberia"]),
    ("LS", "LSO", &["Lesotho"]),
    ("LT", "LTU", &["Lithuania"]),
    ("LU", "LUX", &["Luxembourg"]),
    ("LV", "LVA", &["Latvia"]),
    ("LY", "LBY", &["Libya"]),
    ("MA", "MAR", &["Morocco"]),
    ("MC", "MCO", &["Monaco"]),
    ("MD", "MDA", &["Moldova, Republic of", "Moldova"]),
    ("ME", "MNE", &["Montenegro"]),
    ("MF", "MAF", &["Saint Martin (French part)"]),
    ("MG", "MDG", &["Madagascar"]),
    ("MH", "MHL", &["Marshall Islands"]),
    ("MK", "MKD", &["North Macedonia", "Macedonia"]),
    ("ML", "MLI", &["Mali"]),
    ("MM", "MMR", &["Myanmar"]),
    ("MN", "MNG", &["Mongolia"]),
    ("MO", "MAC", &["Macao", "Macau"]),
    ("MP", "MNP", &["Northern Mariana Islands"]),
    ("MQ", "MTQ", &["Martinique"]),
    ("MR", "MRT", &["Mauritania"]),
    ("MS", "MSR", &["Montserrat"]),
    ("MT", "MLT", &["Malta"]),
    ("MU", "MUS", &["Mauritius"]),
    ("MV", "MDV", &["Maldives"]),
    ("MW", "MWI", &["Malawi"]),
    ("MX", "MEX", &["Mexico"]),
    ("MY", "MYS", &["Malaysia"]),
    ("MZ", "MOZ", &["Mozambique"]),
    ("NA", "NAM", &["Namibia"]),
    ("NC", "NCL", &["New Caledonia"]),
    ("NE", "NER", &["Niger"]),
    ("NF", "NFK", &["Norfolk Island"]),
    ("NG", "NGA", &["Nigeria"]),
    ("NI", "NIC", &["Nicaragua"]),
    ("NL", "NLD", &["Netherlands", "Holland"]),
    ("NO", "NOR", &["Norway"]),
    ("NP", "NPL", &["Nepal"]),
    ("NR", "NRU", &["Nauru"]),
    ("NU", "NIU", &["Niue"]),
    ("NZ", "NZL", &["New Zealand"]),
    ("OM", "OMN", &["Oman"]),
    ("PA", "PAN", &["Panama"]),
    ("PE", "PER", &["Peru"]),
    ("PF", "PYF", &["French Polynesia"]),
    ("PG", "PNG", &["Papua New Guinea"]),
    ("PH", "PHL", &["Philippines"]),
    ("PK", "PAK", &["Pakistan"]),
    ("PL", "POL", &["Poland"]),
    ("PM", "SPM", &["Saint Pierre and Miquelon"]),
    ("PR", "PRI", &["Puerto Rico"]),
    ("PS", "PSE", &["Palestine, State of", "Palestine"]),
    ("PT", "PRT", &["Portugal"]),
    ("PW", "PLW", &["Palau"]),
    ("PY", "PRY", &["Paraguay"]),
    ("QA", "QAT", &["Qatar"]),
    ("RE", "REU", &["Réunion", "Reunion"]),
    ("RO", "ROU", &["Romania"]),
    ("RS", "SRB", &["Serbia"]),
    ("RU", "RUS", &["Russian Federation", "Russia"]),
    ("RW", "RWA", &["Rwanda"]),
    ("SA", "SAU", &["Saudi Arabia"]),
    ("SB", "SLB", &["Solomon Islands"]),
    ("SC", "SYC", &["Seychelles"]),
    ("SD", "SDN", &["Sudan"]),
    ("SE", "SWE", &["Sweden"]),
    ("SG", "SGP", &["Singapore"]),
    ("SI", "SVN", &["Slovenia"]),
    ("SK", "SVK", &["Slovakia"]),
    ("SL", "SLE", &["Sierra Leone"]),
    ("SM", "SMR", &["San Marino"]),
    ("SN", "SEN", &["Senegal"]),
    ("SO", "SOM", &["Somalia"]),
    ("SR", "SUR", &["Suriname"]),
    ("SS", "SSD", &["South Sudan"]),
    ("ST", "STP", &["Sao Tome and Principe"]),
    ("SV", "SLV", &["El Salvador"]),
    ("SX", "SXM", &["Sint Maarten (Dutch part)"]),
    ("SY", "SYR", &["Syrian Arab Republic", "Syria"]),
    ("SZ", "SWZ", &["Eswatini", "Swaziland"]),
    ("TC", "TCA", &["Turks and Caicos Islands"]),
    ("TD", "TCD", &["Chad"]),
    ("TG", "TGO", &["Togo"]),
    ("TH", "THA", &["Thailand"]),
    ("TJ", "TJK", &["Tajikistan"]),
    ("TL", "TLS", &["Timor-Leste", "East Timor"]),
    ("TM", "TKM", &["Turkmenistan"]),
    ("TN", "TUN", &["Tunisia"]),
    ("TO", "TON", &["Tonga"]),
    ("TR", "TUR", &["Türkiye", "Turkey"]),
    ("TT", "TTO", &["Trinidad and Tobago"]),
    ("TV", "TUV", &["Tuvalu"]),
    ("TW", "TWN", &["Taiwan, Province of China", "Taiwan"]),
    ("TZ", "TZA", &["Tanzania, United Republic of", "Tanzania"]),
    ("UA", "UKR", &["Ukraine"]),
    ("UG", "UGA", &["Uganda"]),
    ("US", "USA", &["United States", "United States of America", "USA"]),
    ("UY", "URY", &["Uruguay"]),
    ("UZ", "UZB", &["Uzbekistan"]),
    ("VA", "VAT", &["Holy See (Vatican City State)", "Vatican"]),
    ("VC", "VCT", &["Saint Vincent and the Grenadines"]),
    ("VE", "VEN", &["Venezuela, Bolivarian Republic of", "Venezuela"]),
    ("VG", "VGB", &["Virgin Islands, British"]),
    ("VI", "VIR", &["Virgin Islands, U.S."]),
    ("VN", "VNM", &["Viet Nam", "Vietnam"]),
    ("VU", "VUT", &["Vanuatu"]),
    ("WS", "WSM", &["Samoa"]),
    ("YE", "YEM", &["Yemen"]),
    ("ZA", "ZAF", &["South Africa"]),
    ("ZM", "ZMB", &["Zambia"]),
    ("ZW", "ZWE", &["Zimbabwe"]),
];


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_code() -> impl Strategy<Value = String> {
        prop::sample::select(COUNTRIES.iter().map(|(a2, _, _)| a2.to_string()).collect::<Vec<_>>())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn wildcard_without_deny_passes_everything(
            code in prop::option::of(any_code()),
            extra in prop::collection::vec(any_code(), 0..4),
        ) {
            let spec = std::iter::once("*".to_string()).chain(extra).collect::<Vec<_>>().join(",");
            let policy = CountryPolicy::parse(&spec, &StaticCountryTable).unwrap();
            prop_assert!(policy.allows(code.as_deref()));
        }

        #[test]
        fn single_deny_excludes_only_that_code(denied in any_code(), other in any_code()) {
            let policy = CountryPolicy::parse(&format!("!{}", denied.to_lowercase()), &StaticCountryTable).unwrap();
            prop_assert!(!policy.allows(Some(&denied)));
            if other != denied {
                prop_assert!(policy.allows(Some(&other)));
            }
        }
    }
}
