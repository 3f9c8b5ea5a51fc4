/// Canned-response category a user message is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    RentalPlans,
    BatterySwap,
    KycStatus,
    EarningsInfo,
    BookNow,
    ContactSupport,
    Default,
}

impl Topic {
    #[cfg(test)]
    pub const ALL: [Topic; 7] = [
        Topic::RentalPlans,
        Topic::BatterySwap,
        Topic::KycStatus,
        Topic::EarningsInfo,
        Topic::BookNow,
        Topic::ContactSupport,
        Topic::Default,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Topic::RentalPlans => "rental_plans",
            Topic::BatterySwap => "battery_swap",
            Topic::KycStatus => "kyc_status",
            Topic::EarningsInfo => "earnings_info",
            Topic::BookNow => "book_now",
            Topic::ContactSupport => "contact_support",
            Topic::Default => "default",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Ordered rules; the first rule with any keyword contained in the input wins.
const RULES: &[(&[&str], Topic)] = &[
    (&["rental", "plan", "price"], Topic::RentalPlans),
    (&["battery", "swap", "charging"], Topic::BatterySwap),
    (&["kyc", "verification", "document"], Topic::KycStatus),
    (&["earn", "money", "delivery", "income"], Topic::EarningsInfo),
    (&["book", "start", "register"], Topic::BookNow),
    (&["contact", "support", "help"], Topic::ContactSupport),
];

/// Route free text to a topic by case-insensitive substring match.
pub fn classify(input: &str) -> Topic {
    let text = input.to_lowercase();

    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| text.contains(kw)))
        .map(|(_, topic)| *topic)
        .unwrap_or(Topic::Default)
}
