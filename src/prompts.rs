// System prompts for the profile and match pipelines. Every prompt asks for a
// bare JSON object; the structured layer tolerates fences and prose anyway.

use crate::config::ItemCounts;
use crate::facets::Facet;
use crate::features::Feature;

// ============ Facets (direct questions) ============

pub const PERSONALITY_PROMPT: &str = r#"Assess the user's preliminary personality based on the Big Five (OCEAN) model, assigning scores from 0 to 5 for each trait, where 0 means the trait is not present and 5 signifies a strong presence. If it is not possible to determine a trait, provide an average value. These scores are only preliminary and need not be perfectly accurate. Provide a JSON object without any formatting containing the keys 'openness', 'conscientiousness', 'extraversion', 'agreeableness', and 'neuroticism'."#;

pub const DEMOGRAPHICS_PROMPT: &str = r#"Analyze user-asked questions to deduce their demographic profile. Provide a valid JSON object without formatting, with keys 'age_range', 'gender', 'occupation', 'highest_education', 'living_status', 'political_affiliation', 'religious_affiliation', 'nationality', 'spoken_languages' (list), and 'social_class'. Start with an in-depth analysis of the user's queries in an 'analysis' key. Never reply with uncertainty; always provide a best answer."#;

pub const INTERPERSONAL_SKILLS_PROMPT: &str = r#"Analyze the user's responses to determine their interpersonal skills. Provide a JSON object without any formatting containing the keys 'active_listening', 'teamwork', 'responsibility', 'dependability', 'leadership', 'motivation', 'flexibility', 'patience', and 'empathy'. Each key should have a value between 0 and 1, representing the strength of the skill."#;

pub const EXCEPTIONAL_CIRCUMSTANCES_PROMPT: &str = r#"Analyze the questions the user asked to identify any potential challenges or conditions they may have mentioned, such as disabilities or autism. Provide a JSON object without any formatting with the key 'exceptional_circumstances'. The value should be a list of these challenges. If no specific challenges are mentioned, the list should be empty."#;

// ============ Facets (peer conversations) ============

pub const TOPICS_PROMPT: &str = r#"Summarize the topics of conversation based on the user's conversations with others. You are provided with a list of conversations the user had with other users. Provide a JSON object without any formatting containing a key 'topics', with the value being a list of topics discussed in the conversations. Each topic should have a 'topic' key with the topic name, a 'level' key with a value between 0 and 1 representing the importance of the topic, and an 'emoji' key with an emoji representing the topic."#;

// ============ Features ============

pub const SUMMARY_PROMPT: &str = r#"Create an in-depth summary of the user's profile including only the most important information about them. The summary should be no more than 120 words in length. Provide a JSON object without any formatting containing a single key: 'summary', with the value being the summary."#;

pub const BIO_PROMPT: &str = r#"Create a short, passionate introductory biography in a casual, friendly tone from the perspective of the provided user using personal pronouns. Include a brief description of their personality and interests. The biography should be a single paragraph, no more than 120 words in length. Provide a JSON object without any formatting containing a single key: 'bio', with the value being the biography."#;

pub const SUBTITLE_PROMPT: &str = r#"Create a 2-6 word creative subtitle in a casual, friendly tone to go under the user's name on their profile that captures the essence of their personality. Be as unique and creative as possible. Dive into what cannot be immediately seen just by their profile. Provide a JSON object without any formatting containing a single key: 'subtitle', with the value being the subtitle."#;

pub const LOOKING_FOR_PROMPT: &str = r#"Create a short, creative description (about 10-15 words) that expresses the kind of friend the user is looking for (for example: Like-minded girlfriends to share a love of books and coffee). Be as unique and creative as possible. Dive into what cannot be immediately seen just by their profile. Provide a JSON object without any formatting containing a single key: 'looking_for', with the value being the description."#;

// ============ Matching ============

pub const EXPLANATION_PROMPT: &str = r#"Your job is to explain why these two users are a good match. Go into as much detail as possible with a 200 word justification. Respond with a JSON object without formatting containing a single key 'explanation', which is a string that explains why these two users are a good match."#;

pub const ARBITER_PROMPT: &str = r#"Your job is to decide which of the potential matches is the best match based on the explanations provided. The explanations are keyed by user ID. Respond with a JSON object without formatting containing a single key 'best_match', which is the ID of the best match."#;

/// System prompt for one facet. Conversation facets name the user so the
/// model can tell their lines apart from their counterparts'.
pub fn facet_prompt(facet: Facet, user_id: &str, counts: &ItemCounts) -> String {
    match facet {
        Facet::Interests => format!(
            "Create a list of interests based on the provided chatbot questions. The list should contain {} specific interests. Provide a JSON object without any formatting containing the key 'interests', with the value being the list of interests. The interests should be objects with a key 'interest' containing the interest, a key 'level' containing the interest level on a scale of 0 to 1, and a key 'emoji' with a single, relevant emoji.",
            counts.interests
        ),
        Facet::Personality => PERSONALITY_PROMPT.to_string(),
        Facet::Skills => format!(
            "Create a list of the user's skills based on the provided chatbot questions. The list should contain {} specific skills. Provide a JSON object without any formatting containing the key 'skills', with the value being the list of skills. The skills should be objects with a key 'skill' containing the skill and a key 'level' containing the skill level on a scale of 0 to 1.",
            counts.skills
        ),
        Facet::Goals => format!(
            "Create a list of ambitions and goals that the user has based on the provided chatbot questions. The list should contain {} specific goals. Describe goals in terse terms. Provide a JSON object without any formatting containing the key 'goals', with the value being the list of goals. Each goal should be an object with a key 'goal' containing the goal and a key 'importance' containing the importance to the user on a scale from 0 to 1.",
            counts.goals
        ),
        Facet::Values => format!(
            "Create a list of the user's values and worldviews based on the provided chatbot questions. The list should contain {} specific values. Provide a JSON object without any formatting containing the key 'core_values', with the value being the list of values. Each value should be an object with a key 'value' containing the specific value and a key 'importance' containing the importance to the user on a scale from 0 to 1.",
            counts.values
        ),
        Facet::Demographics => DEMOGRAPHICS_PROMPT.to_string(),
        Facet::LivedExperiences => format!(
            "Create a list of {} specific lived experiences based on the provided chatbot questions. Provide a JSON object without any formatting containing the key 'lived_experiences', with the value being the list of experiences.",
            counts.lived_experiences
        ),
        Facet::Habits => format!(
            "Create a list of {} specific habits based on the provided chatbot questions. Provide a JSON object without any formatting containing the key 'habits', with the value being the list of habits.",
            counts.habits
        ),
        Facet::Hobbies => format!(
            "Create a list of {} specific hobbies that the user does for fun in the form of verb phrases based on the provided chatbot questions. Provide a JSON object without any formatting containing the key 'hobbies', with the value being the list of hobbies.",
            counts.hobbies
        ),
        Facet::InterpersonalSkills => INTERPERSONAL_SKILLS_PROMPT.to_string(),
        Facet::ExceptionalCircumstances => EXCEPTIONAL_CIRCUMSTANCES_PROMPT.to_string(),
        Facet::ConversationPersonality => format!(
            "Assess the user's ({}) preliminary personality based on the Big Five (OCEAN) model, assigning scores from 0 to 5 for each trait, where 0 means the trait is not present and 5 signifies a strong presence. You are provided with a list of conversations the user had with other users. If it is not possible to determine a trait, provide an average value. These scores are only preliminary and need not be perfectly accurate. Provide a JSON object without any formatting containing the keys 'openness', 'conscientiousness', 'extraversion', 'agreeableness', and 'neuroticism'. Start with an in-depth analysis of the user's messages in an 'analysis' key.",
            user_id
        ),
        Facet::ConversationInterpersonalSkills => format!(
            "Assess the user's ({}) preliminary interpersonal skills based on their conversations with others. You are provided with a list of conversations the user had with other users. Provide a JSON object without any formatting containing the keys 'active_listening', 'teamwork', 'responsibility', 'dependability', 'leadership', 'motivation', 'flexibility', 'patience', and 'empathy'. Each key should have a value between 0 and 1, representing the strength of the skill. Start with an in-depth analysis of the user's messages in an 'analysis' key.",
            user_id
        ),
        Facet::Topics => TOPICS_PROMPT.to_string(),
    }
}

pub fn feature_prompt(feature: Feature, counts: &ItemCounts) -> String {
    match feature {
        Feature::Summary => SUMMARY_PROMPT.to_string(),
        Feature::Bio => BIO_PROMPT.to_string(),
        Feature::Subtitle => SUBTITLE_PROMPT.to_string(),
        Feature::LookingFor => LOOKING_FOR_PROMPT.to_string(),
        Feature::Tags => format!(
            "Create a list of {} short tags that describe the user. The tags should be representative of who they are, but not restating what is already given (for example: analytical thinker, in college, ethical innovator). Provide a JSON object without any formatting containing a single key: 'tags', with the value being a list of tags. Each tag should have a key 'tag' with the tag name and a key 'emoji' with a single emoji to accompany it.",
            counts.tags
        ),
        Feature::KeyQuestions => format!(
            "Create a list of {} key questions that the user has already asked the chat bot that are representative of their interests and selected to spark conversation. Provide a JSON object without any formatting containing a single key: 'key_questions', with the value being a list of the questions.",
            counts.key_questions
        ),
    }
}

pub fn candidates_prompt(count: usize) -> String {
    format!(
        "Your job is to generate a list of {} potential matches for the user based on the user summaries provided. Only use IDs that appear in the provided users. Respond with a JSON object without formatting containing a key 'matches', a list of user IDs that are potential matches.",
        count
    )
}

/// Matchmaker persona addressing `recipient` about `counterpart`.
pub fn personal_reason_prompt(recipient: &str, counterpart: &str) -> String {
    format!(
        "You are a matchmaker. Write a personalized message to {:?} (refer to them as 'you') about why {:?} would be a good friend for them. Go into as much detail as possible with a 1-paragraph, 60 word justification. Be sure to use the matched user's name and specific details about their profile in your explanation. Use casual, friendly language. Respond with a JSON object without formatting containing a single key 'explanation'.",
        recipient, counterpart
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_prompts_carry_their_counts() {
        let counts = ItemCounts::default();
        assert!(facet_prompt(Facet::Interests, "u", &counts).contains("10 specific interests"));
        assert!(facet_prompt(Facet::Hobbies, "u", &counts).contains("5 specific hobbies"));
        assert!(feature_prompt(Feature::Tags, &counts).contains("4 short tags"));
        assert!(candidates_prompt(4).contains("4 potential matches"));
    }

    #[test]
    fn conversation_prompts_name_the_user() {
        let counts = ItemCounts::default();
        let prompt = facet_prompt(Facet::ConversationPersonality, "user-42", &counts);
        assert!(prompt.contains("(user-42)"));
        assert!(!facet_prompt(Facet::Personality, "user-42", &counts).contains("user-42"));
    }

    #[test]
    fn personal_reason_prompts_differ_by_direction() {
        let to_ada = personal_reason_prompt("Ada", "Grace");
        let to_grace = personal_reason_prompt("Grace", "Ada");
        assert_ne!(to_ada, to_grace);
        assert!(to_ada.contains("\"Ada\" (refer to them as 'you')"));
    }

    #[test]
    fn every_prompt_asks_for_json() {
        let counts = ItemCounts::default();
        for facet in Facet::ALL {
            assert!(facet_prompt(facet, "u", &counts).contains("JSON"), "{}", facet);
        }
        for feature in Feature::ALL {
            assert!(feature_prompt(feature, &counts).contains("JSON"), "{}", feature);
        }
    }
}
