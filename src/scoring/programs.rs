//! UAE SME support programs and eligibility matching.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramKind {
    Government,
    GovernmentBank,
    Accelerator,
    Grant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Nationality {
    All,
    EmiratiOnly,
}

/// A static catalogue entry. `"all"` in `emirates` or `sectors` lifts that restriction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub id: &'static str,
    pub name: &'static str,
    pub name_localized: &'static str,
    pub kind: ProgramKind,
    pub emirates: &'static [&'static str],
    pub nationalities: Nationality,
    pub min_business_age_years: u32,
    pub max_employees: Option<u32>,
    pub max_annual_revenue: Option<f64>,
    pub sectors: &'static [&'static str],
    pub benefits: &'static [&'static str],
    pub benefits_localized: &'static [&'static str],
    pub website: &'static str,
    pub funding_available: bool,
    pub max_funding: f64,
}

pub static PROGRAMS: [Program; 8] = [
    Program {
        id: "dubai_sme",
        name: "Dubai SME",
        name_localized: "مؤسسة محمد بن راشد لتنمية المشاريع الصغيرة والمتوسطة",
        kind: ProgramKind::Government,
        emirates: &["dubai"],
        nationalities: Nationality::All,
        min_business_age_years: 0,
        max_employees: Some(250),
        max_annual_revenue: Some(250_000_000.0),
        sectors: &["all"],
        benefits: &[
            "Business incubation",
            "Training programs",
            "Mentorship",
            "Networking events",
            "Government procurement priority",
        ],
        benefits_localized: &[
            "حاضنات الأعمال",
            "برامج تدريبية",
            "إرشاد ودعم",
            "فعاليات التواصل",
            "أولوية المشتريات الحكومية",
        ],
        website: "https://www.sme.ae/",
        funding_available: false,
        max_funding: 0.0,
    },
    Program {
        id: "khalifa_fund",
        name: "Khalifa Fund for Enterprise Development",
        name_localized: "صندوق خليفة لتطوير المشاريع",
        kind: ProgramKind::Government,
        emirates: &["abu_dhabi", "all"],
        nationalities: Nationality::EmiratiOnly,
        min_business_age_years: 0,
        max_employees: Some(100),
        max_annual_revenue: Some(50_000_000.0),
        sectors: &["all"],
        benefits: &[
            "Interest-free loans up to AED 3M",
            "Business coaching",
            "Training programs",
            "Export support",
        ],
        benefits_localized: &[
            "قروض بدون فوائد حتى 3 مليون درهم",
            "تدريب على الأعمال",
            "برامج تدريبية",
            "دعم التصدير",
        ],
        website: "https://www.khalifafund.gov.ae/",
        funding_available: true,
        max_funding: 3_000_000.0,
    },
    Program {
        id: "mbrf",
        name: "Mohammed Bin Rashid Innovation Fund",
        name_localized: "صندوق محمد بن راشد للابتكار",
        kind: ProgramKind::Government,
        emirates: &["all"],
        nationalities: Nationality::All,
        min_business_age_years: 1,
        max_employees: None,
        max_annual_revenue: None,
        sectors: &["technology", "innovation", "manufacturing"],
        benefits: &[
            "Innovation funding",
            "R&D grants",
            "Patent support",
            "Technology transfer",
        ],
        benefits_localized: &[
            "تمويل الابتكار",
            "منح البحث والتطوير",
            "دعم براءات الاختراع",
            "نقل التكنولوجيا",
        ],
        website: "https://www.mbrif.ae/",
        funding_available: true,
        max_funding: 5_000_000.0,
    },
    Program {
        id: "edb",
        name: "Emirates Development Bank",
        name_localized: "مصرف الإمارات للتنمية",
        kind: ProgramKind::GovernmentBank,
        emirates: &["all"],
        nationalities: Nationality::All,
        min_business_age_years: 1,
        max_employees: Some(250),
        max_annual_revenue: Some(250_000_000.0),
        sectors: &[
            "manufacturing",
            "technology",
            "healthcare",
            "food_processing",
            "renewable_energy",
        ],
        benefits: &[
            "Competitive financing",
            "Working capital loans",
            "Equipment financing",
            "Trade finance",
        ],
        benefits_localized: &[
            "تمويل تنافسي",
            "قروض رأس المال العامل",
            "تمويل المعدات",
            "تمويل التجارة",
        ],
        website: "https://www.edb.gov.ae/",
        funding_available: true,
        max_funding: 10_000_000.0,
    },
    Program {
        id: "in5",
        name: "in5 Innovation Centers",
        name_localized: "مراكز الابتكار in5",
        kind: ProgramKind::Accelerator,
        emirates: &["dubai"],
        nationalities: Nationality::All,
        min_business_age_years: 0,
        max_employees: Some(20),
        max_annual_revenue: Some(10_000_000.0),
        sectors: &["technology", "media", "design"],
        benefits: &[
            "Co-working space",
            "Visa sponsorship",
            "100% ownership",
            "Mentorship",
            "Access to investors",
        ],
        benefits_localized: &[
            "مساحة عمل مشتركة",
            "كفالة التأشيرة",
            "ملكية 100%",
            "إرشاد",
            "الوصول للمستثمرين",
        ],
        website: "https://infive.ae/",
        funding_available: false,
        max_funding: 0.0,
    },
    Program {
        id: "sheraa",
        name: "Sheraa Sharjah Entrepreneurship Center",
        name_localized: "مركز الشارقة لريادة الأعمال شرّاع",
        kind: ProgramKind::Accelerator,
        emirates: &["sharjah"],
        nationalities: Nationality::All,
        min_business_age_years: 0,
        max_employees: Some(50),
        max_annual_revenue: Some(20_000_000.0),
        sectors: &["all"],
        benefits: &[
            "Startup incubation",
            "Seed funding",
            "Mentorship",
            "Office space",
            "Legal support",
        ],
        benefits_localized: &[
            "حاضنة الشركات الناشئة",
            "تمويل تأسيسي",
            "إرشاد",
            "مساحة مكتبية",
            "دعم قانوني",
        ],
        website: "https://sheraa.ae/",
        funding_available: true,
        max_funding: 500_000.0,
    },
    Program {
        id: "rak_sme",
        name: "RAK SME",
        name_localized: "دائرة المشاريع الصغيرة والمتوسطة رأس الخيمة",
        kind: ProgramKind::Government,
        emirates: &["rak"],
        nationalities: Nationality::All,
        min_business_age_years: 0,
        max_employees: Some(100),
        max_annual_revenue: Some(50_000_000.0),
        sectors: &["all"],
        benefits: &[
            "Business licensing support",
            "Training",
            "Networking",
            "Exhibition support",
        ],
        benefits_localized: &["دعم ترخيص الأعمال", "تدريب", "تواصل", "دعم المعارض"],
        website: "https://raksme.ae/",
        funding_available: false,
        max_funding: 0.0,
    },
    Program {
        id: "expo_live",
        name: "Expo Live Innovation Impact Grant",
        name_localized: "منحة إكسبو لايف للابتكار",
        kind: ProgramKind::Grant,
        emirates: &["all"],
        nationalities: Nationality::All,
        min_business_age_years: 0,
        max_employees: None,
        max_annual_revenue: None,
        sectors: &["sustainability", "social_impact", "innovation"],
        benefits: &[
            "Grant up to $100K",
            "Global exposure",
            "Mentorship",
            "Network access",
        ],
        benefits_localized: &[
            "منحة حتى 100 ألف دولار",
            "انتشار عالمي",
            "إرشاد",
            "الوصول للشبكات",
        ],
        website: "https://www.expo2020dubai.com/en/programmes/expo-live",
        funding_available: true,
        max_funding: 367_000.0,
    },
];

pub fn find_program(id: &str) -> Option<&'static Program> {
    PROGRAMS.iter().find(|p| p.id == id)
}

/// What eligibility needs to know about a business.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusinessFacts {
    pub emirate: String,
    pub owner_nationality: String,
    pub business_type: String,
    pub employee_count: u32,
    pub annual_revenue: f64,
    /// `None` when the license issue date is unknown; the age rule is then skipped.
    pub business_age_years: Option<f64>,
    pub has_trade_license: bool,
}

fn normalize_emirate(emirate: &str) -> String {
    let key = emirate.trim().to_lowercase().replace([' ', '-'], "_");
    match key.as_str() {
        "ras_al_khaimah" => "rak".to_string(),
        _ => key,
    }
}

fn is_emirati(nationality: &str) -> bool {
    matches!(
        nationality.trim().to_lowercase().as_str(),
        "emirati" | "uae" | "emirati national"
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub score: i32,
    pub notes: Vec<String>,
    pub missing: Vec<String>,
}

/// Score a business against one program.
///
/// Emirate and nationality failures disqualify outright; the funding bonus
/// cannot lift a disqualified program back to eligible.
pub fn check_eligibility(program: &Program, facts: &BusinessFacts) -> Eligibility {
    let mut score: i32 = 100;
    let mut disqualified = false;
    let mut notes = Vec::new();
    let mut missing = Vec::new();

    let emirate = normalize_emirate(&facts.emirate);
    if !program.emirates.iter().any(|e| *e == "all" || *e == emirate) {
        score -= 100;
        disqualified = true;
        missing.push(format!("Must be in {}", program.emirates.join(", ")));
    }

    if program.nationalities == Nationality::EmiratiOnly && !is_emirati(&facts.owner_nationality) {
        score -= 100;
        disqualified = true;
        missing.push("Emirati ownership required".to_string());
    }

    if let Some(max) = program.max_employees {
        if facts.employee_count > max {
            score -= 30;
            missing.push(format!("Maximum {} employees", max));
        }
    }

    if let Some(max) = program.max_annual_revenue {
        if facts.annual_revenue > max {
            score -= 30;
            missing.push(format!("Maximum revenue AED {:.0}", max));
        }
    }

    if program.min_business_age_years > 0 {
        if let Some(age) = facts.business_age_years {
            if age < program.min_business_age_years as f64 {
                score -= 20;
                missing.push(format!(
                    "Business must be {}+ years old",
                    program.min_business_age_years
                ));
            }
        }
    }

    if !program.sectors.contains(&"all") {
        let business_type = facts.business_type.to_lowercase();
        if !program.sectors.iter().any(|s| business_type.contains(s)) {
            score -= 20;
            notes.push(format!("Priority sectors: {}", program.sectors.join(", ")));
        }
    }

    if program.funding_available {
        score += 10;
        notes.push("Funding available".to_string());
    }

    Eligibility {
        eligible: !disqualified && score > 0,
        score: score.clamp(0, 100),
        notes,
        missing,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramMatch {
    pub program_id: String,
    pub name: String,
    pub name_localized: String,
    pub match_score: i32,
    pub funding_available: bool,
    pub max_funding: f64,
    pub website: String,
    pub benefits: Vec<String>,
    pub eligibility_notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramMatches {
    pub total_matches: usize,
    pub funding_programs: usize,
    pub total_potential_funding: f64,
    pub matches: Vec<ProgramMatch>,
}

/// Eligible programs, best match first.
pub fn matching_programs(facts: &BusinessFacts) -> ProgramMatches {
    let mut matches: Vec<ProgramMatch> = PROGRAMS
        .iter()
        .filter_map(|program| {
            let eligibility = check_eligibility(program, facts);
            eligibility.eligible.then(|| ProgramMatch {
                program_id: program.id.to_string(),
                name: program.name.to_string(),
                name_localized: program.name_localized.to_string(),
                match_score: eligibility.score,
                funding_available: program.funding_available,
                max_funding: program.max_funding,
                website: program.website.to_string(),
                benefits: program.benefits.iter().map(|b| b.to_string()).collect(),
                eligibility_notes: eligibility.notes,
            })
        })
        .collect();
    matches.sort_by(|a, b| b.match_score.cmp(&a.match_score));

    let funded: Vec<&ProgramMatch> = matches.iter().filter(|m| m.funding_available).collect();
    ProgramMatches {
        total_matches: matches.len(),
        funding_programs: funded.len(),
        total_potential_funding: funded.iter().map(|m| m.max_funding).sum(),
        matches,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Ready,
    Missing,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub document: String,
    pub document_localized: String,
    pub required: bool,
    pub status: DocumentStatus,
}

fn item(document: &str, localized: &str, required: bool, status: DocumentStatus) -> ChecklistItem {
    ChecklistItem {
        document: document.to_string(),
        document_localized: localized.to_string(),
        required,
        status,
    }
}

/// Documents to prepare before applying.
pub fn application_checklist(program: &Program, facts: &BusinessFacts) -> Vec<ChecklistItem> {
    let license = if facts.has_trade_license {
        DocumentStatus::Ready
    } else {
        DocumentStatus::Missing
    };

    let mut docs = vec![
        item("Trade License", "الرخصة التجارية", true, license),
        item(
            "Emirates ID (Owner)",
            "الهوية الإماراتية للمالك",
            true,
            DocumentStatus::Unknown,
        ),
        item(
            "Bank Statement (6 months)",
            "كشف حساب بنكي (6 أشهر)",
            true,
            DocumentStatus::Unknown,
        ),
        item(
            "Business Plan",
            "خطة العمل",
            program.funding_available,
            DocumentStatus::Unknown,
        ),
        item(
            "Financial Statements",
            "البيانات المالية",
            program.funding_available,
            DocumentStatus::Unknown,
        ),
    ];

    if program.nationalities == Nationality::EmiratiOnly {
        docs.push(item(
            "Family Book (Khulasat Al Qaid)",
            "خلاصة القيد",
            true,
            DocumentStatus::Unknown,
        ));
    }
    docs
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextStep {
    pub step: u32,
    pub action: String,
    pub action_localized: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

pub fn next_steps(program: &Program) -> Vec<NextStep> {
    [
        ("Visit the program website", "زيارة موقع البرنامج"),
        ("Prepare required documents", "تحضير الوثائق المطلوبة"),
        ("Submit online application", "تقديم الطلب عبر الإنترنت"),
        ("Schedule assessment meeting", "جدولة اجتماع التقييم"),
    ]
    .iter()
    .enumerate()
    .map(|(index, (action, localized))| NextStep {
        step: index as u32 + 1,
        action: action.to_string(),
        action_localized: localized.to_string(),
        url: (index == 0).then(|| program.website.to_string()),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dubai_grocery() -> BusinessFacts {
        BusinessFacts {
            emirate: "Dubai".to_string(),
            owner_nationality: "Indian".to_string(),
            business_type: "grocery".to_string(),
            employee_count: 5,
            annual_revenue: 1_200_000.0,
            business_age_years: Some(3.0),
            has_trade_license: true,
        }
    }

    #[test]
    fn test_catalogue_ids_are_unique() {
        for (i, a) in PROGRAMS.iter().enumerate() {
            for b in PROGRAMS.iter().skip(i + 1) {
                assert_ne!(a.id, b.id);
            }
        }
        assert!(find_program("sheraa").is_some());
        assert!(find_program("nope").is_none());
    }

    #[test]
    fn test_emirate_gate() {
        let facts = dubai_grocery();
        let dubai = check_eligibility(find_program("dubai_sme").unwrap(), &facts);
        assert!(dubai.eligible);
        assert_eq!(dubai.score, 100);

        let sharjah = check_eligibility(find_program("sheraa").unwrap(), &facts);
        assert!(!sharjah.eligible);
        assert_eq!(sharjah.score, 10);
        assert_eq!(sharjah.missing, vec!["Must be in sharjah"]);
    }

    #[test]
    fn test_emirati_only_gate() {
        let mut facts = dubai_grocery();
        let khalifa = find_program("khalifa_fund").unwrap();
        assert!(!check_eligibility(khalifa, &facts).eligible);

        facts.owner_nationality = "Emirati".to_string();
        let result = check_eligibility(khalifa, &facts);
        assert!(result.eligible);
        // 100 + 10 funding, clamped
        assert_eq!(result.score, 100);
    }

    #[test]
    fn test_sector_and_age_penalties() {
        let mut facts = dubai_grocery();
        facts.business_age_years = Some(0.5);
        let edb = check_eligibility(find_program("edb").unwrap(), &facts);
        // 100 - 20 age - 20 sector + 10 funding
        assert_eq!(edb.score, 70);
        assert!(edb.eligible);
        assert_eq!(edb.notes.len(), 2);
        assert_eq!(edb.missing, vec!["Business must be 1+ years old"]);

        facts.business_age_years = None;
        assert_eq!(check_eligibility(find_program("edb").unwrap(), &facts).score, 90);
    }

    #[test]
    fn test_size_limits() {
        let mut facts = dubai_grocery();
        facts.employee_count = 30;
        facts.annual_revenue = 12_000_000.0;
        let in5 = check_eligibility(find_program("in5").unwrap(), &facts);
        // 100 - 30 - 30 - 20 sector
        assert_eq!(in5.score, 20);
        assert_eq!(in5.missing.len(), 2);
    }

    #[test]
    fn test_matching_programs_sorted() {
        let matches = matching_programs(&dubai_grocery());
        let scores: Vec<i32> = matches.matches.iter().map(|m| m.match_score).collect();
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(scores, sorted);
        assert!(matches.matches.iter().all(|m| m.program_id != "khalifa_fund"));
        assert!(matches.matches.iter().all(|m| m.program_id != "rak_sme"));
        assert_eq!(
            matches.funding_programs,
            matches.matches.iter().filter(|m| m.funding_available).count()
        );
    }

    #[test]
    fn test_rak_alias() {
        let mut facts = dubai_grocery();
        facts.emirate = "Ras Al Khaimah".to_string();
        assert!(check_eligibility(find_program("rak_sme").unwrap(), &facts).eligible);
    }

    #[test]
    fn test_checklist() {
        let mut facts = dubai_grocery();
        facts.has_trade_license = false;
        let khalifa = find_program("khalifa_fund").unwrap();
        let docs = application_checklist(khalifa, &facts);
        assert_eq!(docs.len(), 6);
        assert_eq!(docs[0].status, DocumentStatus::Missing);
        assert!(docs[3].required);

        let docs = application_checklist(find_program("dubai_sme").unwrap(), &dubai_grocery());
        assert_eq!(docs.len(), 5);
        assert_eq!(docs[0].status, DocumentStatus::Ready);
        assert!(!docs[4].required);

        let steps = next_steps(khalifa);
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].url.as_deref(), Some("https://www.khalifafund.gov.ae/"));
        assert!(steps[1].url.is_none());
    }
}
