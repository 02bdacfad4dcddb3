// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Disease taxonomy and care plans
//!
//! The inference service reports raw class labels, either as a numeric index
//! or as a name. Both map onto the fixed set of six conditions below, each
//! carrying static treatment, recommendation, and prevention text. Unmapped
//! labels get a placeholder plan rather than an error.

/// The six recognized oral conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Calculus,
    Caries,
    Gingivitis,
    Hypodontia,
    ToothDiscoloration,
    Ulcers,
}

/// Static guidance attached to a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarePlan {
    pub treatment: &'static str,
    pub recommendation: &'static str,
    pub prevention: &'static str,
    pub source: &'static str,
}

/// Placeholder plan for labels outside the taxonomy.
pub const UNMAPPED_PLAN: CarePlan = CarePlan {
    treatment: "No treatment plan available.",
    recommendation: "No recommendations available.",
    prevention: "No prevention guidance available.",
    source: "N/A",
};

impl Condition {
    /// Map the single-label numeric class index.
    pub fn from_index(index: u64) -> Option<Self> {
        match index {
            0 => Some(Condition::Calculus),
            1 => Some(Condition::Caries),
            2 => Some(Condition::Gingivitis),
            3 => Some(Condition::Hypodontia),
            4 => Some(Condition::ToothDiscoloration),
            5 => Some(Condition::Ulcers),
            _ => None,
        }
    }

    /// Map a raw class label. Tolerant of case and the hyphen/space and
    /// "Mouth Ulcer" variants different service versions emit.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "calculus" => Some(Condition::Calculus),
            "caries" => Some(Condition::Caries),
            "gingivitis" => Some(Condition::Gingivitis),
            "hypodontia" => Some(Condition::Hypodontia),
            "toothdiscoloration" => Some(Condition::ToothDiscoloration),
            "ulcers" | "ulcer" | "mouthulcer" | "mouthulcers" => Some(Condition::Ulcers),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Condition::Calculus => "Calculus",
            Condition::Caries => "Caries",
            Condition::Gingivitis => "Gingivitis",
            Condition::Hypodontia => "Hypodontia",
            Condition::ToothDiscoloration => "Tooth Discoloration",
            Condition::Ulcers => "Ulcers",
        }
    }

    pub fn care_plan(&self) -> CarePlan {
        match self {
            Condition::Calculus => CarePlan {
                treatment: "Professional dental cleaning to remove plaque and tartar using \
                            ultrasonic instruments or hand scalers. Left untreated, it can lead \
                            to gum disease. Cleaning is usually done by a dental hygienist or \
                            dentist.",
                recommendation: "Brush twice daily with fluoride toothpaste and floss once a \
                                 day. Regular dental cleanings every 6 months are essential to \
                                 prevent calculus buildup.",
                prevention: "Daily brushing and flossing stop plaque from hardening into \
                             tartar. Drink water after meals and keep up twice-yearly dental \
                             visits.",
                source: "American Dental Association (ADA), Mayo Clinic",
            },
            Condition::Caries => CarePlan {
                treatment: "Cavities are treated by removing decayed material and filling the \
                            area. Severe decay may require a root canal or crown. Early \
                            detection allows for less invasive procedures.",
                recommendation: "Limit sugary snacks and drinks. Brush with fluoride \
                                 toothpaste, floss daily, and get regular check-ups to catch \
                                 early signs.",
                prevention: "Cut down on sugar between meals, use fluoride toothpaste, and \
                             consider dental sealants for molars.",
                source: "World Health Organization (WHO), ADA",
            },
            Condition::Gingivitis => CarePlan {
                treatment: "Mild gum inflammation can be reversed with professional cleaning \
                            and better oral hygiene. Severe cases might need scaling and root \
                            planing.",
                recommendation: "Use antiseptic mouthwash and floss daily to remove plaque \
                                 between teeth. Avoid tobacco use.",
                prevention: "Brush along the gumline twice a day, floss daily, and avoid \
                             smoking. Early bleeding gums deserve a dental visit.",
                source: "Centers for Disease Control and Prevention (CDC), NHS UK",
            },
            Condition::Hypodontia => CarePlan {
                treatment: "Treatment depends on the number and position of missing teeth. It \
                            may include orthodontics, partial dentures, or dental implants.",
                recommendation: "Children with missing teeth should be monitored regularly. A \
                                 dental specialist can develop a long-term plan including \
                                 aesthetic and functional solutions.",
                prevention: "Hypodontia is largely congenital; early orthodontic assessment \
                             limits spacing and bite complications.",
                source: "American Association of Orthodontists (AAO), Cleveland Clinic",
            },
            Condition::ToothDiscoloration => CarePlan {
                treatment: "Whitening treatments include in-office bleaching, at-home trays, \
                            or veneers for intrinsic stains. Professional assessment is \
                            required to identify the cause.",
                recommendation: "Reduce intake of coffee, tea, and red wine. Avoid tobacco, \
                                 and rinse your mouth after eating stain-causing foods.",
                prevention: "Rinse after staining foods and drinks, avoid tobacco, and brush \
                             with a whitening toothpaste approved by your dentist.",
                source: "Mayo Clinic, ADA",
            },
            Condition::Ulcers => CarePlan {
                treatment: "Minor ulcers usually heal on their own, but topical \
                            corticosteroids, antimicrobial mouth rinses, or anesthetic gels \
                            can speed healing and reduce pain.",
                recommendation: "Avoid spicy or acidic foods. Stay hydrated and maintain oral \
                                 hygiene. If ulcers persist for more than 2 weeks, consult a \
                                 dentist.",
                prevention: "Avoid known trigger foods, manage stress, and use a soft-bristled \
                             brush to limit mouth trauma.",
                source: "WebMD, NHS UK",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_maps_all_six_classes() {
        assert_eq!(Condition::from_index(0), Some(Condition::Calculus));
        assert_eq!(Condition::from_index(3), Some(Condition::Hypodontia));
        assert_eq!(Condition::from_index(5), Some(Condition::Ulcers));
        assert_eq!(Condition::from_index(6), None);
    }

    #[test]
    fn label_mapping_tolerates_service_variants() {
        assert_eq!(Condition::from_label("Caries"), Some(Condition::Caries));
        assert_eq!(Condition::from_label("caries"), Some(Condition::Caries));
        assert_eq!(
            Condition::from_label("Tooth-Discoloration"),
            Some(Condition::ToothDiscoloration)
        );
        assert_eq!(
            Condition::from_label("Tooth Discoloration"),
            Some(Condition::ToothDiscoloration)
        );
        assert_eq!(Condition::from_label("Mouth Ulcer"), Some(Condition::Ulcers));
        assert_eq!(Condition::from_label("something else"), None);
    }

    #[test]
    fn every_condition_has_a_care_plan() {
        for condition in [
            Condition::Calculus,
            Condition::Caries,
            Condition::Gingivitis,
            Condition::Hypodontia,
            Condition::ToothDiscoloration,
            Condition::Ulcers,
        ] {
            let plan = condition.care_plan();
            assert!(!plan.treatment.is_empty());
            assert!(!plan.recommendation.is_empty());
            assert!(!plan.prevention.is_empty());
            assert!(!plan.source.is_empty());
        }
    }

    #[test]
    fn unmapped_plan_is_a_placeholder_not_an_error() {
        assert_eq!(UNMAPPED_PLAN.treatment, "No treatment plan available.");
    }
}
