//! Enumerations stored as lowercase text in the database and on the wire

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parse failure for a stored or submitted enum name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant { kind: $kind, value: s.to_string() }),
                }
            }
        }
    };
}

text_enum!(
    /// Product / group / template category
    Category, "category", {
        Electronics => "electronics",
        Home => "home",
        Fashion => "fashion",
        Beauty => "beauty",
        Sports => "sports",
        Books => "books",
        Games => "games",
        Toys => "toys",
        Health => "health",
        General => "general",
    }
);

text_enum!(
    /// E-commerce platform a listing comes from
    Platform, "platform", {
        Amazon => "amazon",
        MercadoLivre => "mercadolivre",
        Shopee => "shopee",
        AliExpress => "aliexpress",
        Magalu => "magalu",
    }
);

text_enum!(
    /// Commission quality band
    CommissionQuality, "commission quality", {
        Excellent => "excellent",
        Good => "good",
        Regular => "regular",
        Low => "low",
    }
);

text_enum!(
    /// Delivery record status
    DeliveryStatus, "delivery status", {
        Pending => "pending",
        Sent => "sent",
        Failed => "failed",
        Delivered => "delivered",
        Read => "read",
    }
);

text_enum!(
    /// Declared template variable type
    VariableType, "variable type", {
        Text => "text",
        Number => "number",
        Currency => "currency",
        Url => "url",
    }
);

impl CommissionQuality {
    /// Band a commission rate expressed as a fraction (0–1)
    ///
    /// ≥0.15 excellent, ≥0.10 good, ≥0.05 regular, else low.
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 0.15 {
            CommissionQuality::Excellent
        } else if rate >= 0.10 {
            CommissionQuality::Good
        } else if rate >= 0.05 {
            CommissionQuality::Regular
        } else {
            CommissionQuality::Low
        }
    }
}

impl DeliveryStatus {
    /// Whether a record may move from `self` to `next`
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Pending, Sent) | (Pending, Failed) | (Sent, Delivered) | (Sent, Read) | (Delivered, Read)
        )
    }
}

impl Category {
    /// Search keywords used by the source fetchers
    pub fn search_query(&self) -> &'static str {
        match self {
            Category::Electronics => "eletronicos",
            Category::Home => "casa cozinha",
            Category::Fashion => "moda",
            Category::Beauty => "beleza",
            Category::Sports => "esportes",
            Category::Books => "livros",
            Category::Games => "games",
            Category::Toys => "brinquedos",
            Category::Health => "saude",
            Category::General => "ofertas",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), *category);
        }
        assert_eq!("MercadoLivre".parse::<Platform>().unwrap(), Platform::MercadoLivre);
        assert!("ebay".parse::<Platform>().is_err());
    }

    #[test]
    fn test_quality_bands() {
        assert_eq!(CommissionQuality::from_rate(0.20), CommissionQuality::Excellent);
        assert_eq!(CommissionQuality::from_rate(0.15), CommissionQuality::Excellent);
        assert_eq!(CommissionQuality::from_rate(0.1499), CommissionQuality::Good);
        assert_eq!(CommissionQuality::from_rate(0.10), CommissionQuality::Good);
        assert_eq!(CommissionQuality::from_rate(0.05), CommissionQuality::Regular);
        assert_eq!(CommissionQuality::from_rate(0.03), CommissionQuality::Low);
        assert_eq!(CommissionQuality::from_rate(0.0), CommissionQuality::Low);
    }

    #[test]
    fn test_quality_is_monotonic() {
        let rank = |q: CommissionQuality| match q {
            CommissionQuality::Low => 0,
            CommissionQuality::Regular => 1,
            CommissionQuality::Good => 2,
            CommissionQuality::Excellent => 3,
        };
        let mut previous = 0;
        for step in 0..=100 {
            let current = rank(CommissionQuality::from_rate(step as f64 / 100.0));
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_delivery_transitions() {
        use DeliveryStatus::*;
        assert!(Pending.can_transition_to(Sent));
        assert!(Pending.can_transition_to(Failed));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Read));
        assert!(!Failed.can_transition_to(Sent));
        assert!(!Read.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Read));
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Platform::MercadoLivre).unwrap(), "\"mercadolivre\"");
        let q: CommissionQuality = serde_json::from_str("\"excellent\"").unwrap();
        assert_eq!(q, CommissionQuality::Excellent);
    }
}
