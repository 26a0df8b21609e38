/// Built-in scenarios per theme, indexed by difficulty - 1
const WORKPLACE: [&str; 3] = [
    "Your coworker keeps microwaving fish in the office kitchen. How do you address this delicate situation?",
    "You accidentally sent a message complaining about your boss to your boss. The message was just delivered. What's your strategy?",
    "You're in charge of organizing the office holiday party, but you have a budget of $12 and everyone has dietary restrictions. How do you pull this off?",
];

const SOCIAL: [&str; 3] = [
    "You're at a party where you don't know anyone except the host, who just disappeared. How do you survive the next hour?",
    "You accidentally called your friend by their ex's name during their wedding speech. Everyone heard it. How do you recover?",
    "You're stuck in a group chat with your ex, their new partner, and your current partner planning a mutual friend's surprise party. How do you navigate this?",
];

const TECHNOLOGY: [&str; 3] = [
    "Your phone's autocorrect has become sentient and is now changing your messages to be increasingly dramatic. How do you communicate normally?",
    "Every smart device in your home has formed an alliance against you. They're not malicious, just very disappointed. How do you win them back?",
    "You've been selected to negotiate a peace treaty between humans and AI, but the AI only communicates through memes. How do you proceed?",
];

const GENERAL: [&str; 3] = [
    "You wake up and discover that everyone else in the world has disappeared, but they left detailed notes about what they expect you to accomplish while they're gone. What's your plan?",
    "You've been appointed as the Earth's ambassador to a visiting alien species, but they communicate entirely through interpretive dance. How do you establish diplomatic relations?",
    "Time moves backwards every Tuesday, but only for you. Everyone else experiences Tuesday normally. How do you use this to your advantage without going insane?",
];

/// Extra scenarios per theme, used once the catalog door at a difficulty is used up
const WORKPLACE_EXTRA: [&str; 3] = [
    "You're stuck in an elevator with your boss, who just found out you've been using the company printer for your side business. How do you handle the next 30 minutes?",
    "The office printer only works when someone compliments it out loud, and you have a board deck due in ten minutes. What do you say?",
    "Your team's video call filter turned everyone into potatoes and nobody can switch it off before the client joins. How do you run the meeting?",
];

const SOCIAL_EXTRA: [&str; 3] = [
    "You accidentally liked your ex's photo from three years ago while stalking their profile at 2 AM. They just texted 'hey stranger'. What's your response?",
    "You told a new friend you love hiking to seem interesting. They just invited you on a five day mountain trek. How do you get out of it, or survive it?",
    "Your neighbor keeps signing for your packages and then wearing what's inside. Today it was your wedding outfit. How do you bring it up?",
];

const TECHNOLOGY_EXTRA: [&str; 3] = [
    "Your smart fridge has started ordering groceries based on its own dietary goals, which involve a lot of kale. How do you regain control of your kitchen?",
    "Your robot vacuum has learned to open doors and now rearranges the furniture every night to make cleaning easier. How do you negotiate with it?",
    "A firmware update made your car's navigation voice deeply passive aggressive, and it refuses to take the highway. How do you get to the airport on time?",
];

const GENERAL_EXTRA: [&str; 3] = [
    "Gravity works sideways on Tuesdays, but only in your house. How do you make breakfast?",
    "Your shadow has started showing up to places five minutes before you do, and people are beginning to prefer it. How do you win your friends back?",
    "Every lie you tell turns into a small bird that follows you around. You just told three at a dinner party. What's your next move?",
];

/// Scenarios any theme may draw on after its own pools are used up
const WILDCARDS: [&str; 5] = [
    "You're exploring an ancient temple and triggered a trap. The walls are closing in, but they're moving very slowly and you notice the mechanism is powered by a hamster wheel. What do you do?",
    "You found a locked briefcase in your attic with your name on it, but you've never seen it before. It's ticking. What's your next move?",
    "Your goldfish has started giving you life advice, and it's surprisingly good. Your friends think you're losing it. How do you handle this?",
    "You're stranded on a desert island with only a smartphone at 1% battery and surprisingly good WiFi. What do you do?",
    "A wizard offers you one wish, but it must be granted through the terms and conditions of a streaming service you never subscribed to. What do you wish for?",
];

/// Complications appended once every fallback text of a theme has been used
pub const TWISTS: [&str; 4] = [
    "Oh, and you only have five minutes.",
    "Also, everyone involved can only speak in questions.",
    "To make it worse, your phone is at 2% battery.",
    "And somehow your grandmother is watching.",
];

pub const THEMES: [&str; 4] = ["general", "workplace", "social", "technology"];

pub const SOLUTION_TYPES: [&str; 3] = ["creative", "practical", "humorous"];

/// Scenario text for a theme and difficulty; unknown themes use the general pool
pub fn scenario(theme: &str, difficulty: u8) -> &'static str {
    let pool = match theme {
        "workplace" => &WORKPLACE,
        "social" => &SOCIAL,
        "technology" => &TECHNOLOGY,
        _ => &GENERAL,
    };
    let index = difficulty.clamp(1, 3) as usize - 1;
    pool[index]
}

/// Fallback texts for generated doors of a theme: its extra pool first, then the shared wildcards
pub fn generated_scenarios(theme: &str) -> impl Iterator<Item = &'static str> {
    let extra = match theme {
        "workplace" => &WORKPLACE_EXTRA,
        "social" => &SOCIAL_EXTRA,
        "technology" => &TECHNOLOGY_EXTRA,
        _ => &GENERAL_EXTRA,
    };
    extra.iter().chain(WILDCARDS.iter()).copied()
}
