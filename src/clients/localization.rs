//! 本地化字符串服务
//!
//! 真实的多语言查找是外部服务；`StaticLocalizer` 内置一份英文模板，
//! 支持 `{param}` 占位符替换，未知键原样返回。

use phf::phf_map;

/// 外部本地化服务
pub trait Localizer: Send + Sync {
    fn get_localized_string(&self, key: &str, language: &str, params: &[(&str, String)]) -> String;
}

static EN_TEMPLATES: phf::Map<&'static str, &'static str> = phf_map! {
    "noResponse" => "No response was provided for this question.",
    "noOptionSelected" => "No option was selected.",
    "invalidSelection" => "Your selection \"{selection}\" does not match any of the available options.",
    "correctSelection" => "Correct! \"{choice}\" is the right answer.",
    "incorrectSelection" => "\"{choice}\" is not the correct answer.",
    "correctChoiceSelected" => "\"{choice}\" is correct (+{points} points).",
    "incorrectChoiceSelected" => "\"{choice}\" is incorrect.",
    "incorrectChoicePenalty" => "\"{choice}\" is incorrect (-{points} points).",
    "missedCorrectChoice" => "You did not select \"{choice}\", which was correct.",
    "allCorrectSelected" => "You selected all of the correct options.",
    "trueFalseCorrect" => "Correct! The statement is {answer}.",
    "trueFalseIncorrect" => "Incorrect. The statement is {answer}.",
    "emptyTextResponse" => "The text response cannot be empty.",
    "emptyUrlResponse" => "The URL response cannot be empty.",
    "invalidUrl" => "\"{url}\" is not a valid URL.",
    "noChoicesProvided" => "At least one choice must be provided.",
    "invalidTrueFalse" => "\"{answer}\" could not be interpreted as true or false.",
    "missingTrueFalse" => "A true/false answer is required.",
    "noFilesProvided" => "At least one file must be uploaded.",
    "invalidFileReference" => "File \"{filename}\" is missing its storage key and bucket or its GitHub URL.",
    "noImagesProvided" => "At least one image must be uploaded.",
    "invalidImageReference" => "Image \"{filename}\" is missing its data, URL or storage location.",
    "emptyPresentation" => "The presentation must include a transcript, slides or a recording.",
    "urlFetchFailed" => "The submitted URL ({url}) could not be accessed, so no points could be awarded. Please make sure the link is public and try again.",
    "encouragement" => "Good effort!",
    "improvement" => "Review the feedback above to improve your answer.",
    "finalScore" => "Final Score: {points}/{max} ({percent}%).",
    "scoreCorrected" => "Note: the score was adjusted to {points} to match the evaluation above.",
};

/// 内置英文模板的本地化实现
#[derive(Debug, Default, Clone)]
pub struct StaticLocalizer;

impl StaticLocalizer {
    pub fn new() -> Self {
        Self
    }
}

impl Localizer for StaticLocalizer {
    fn get_localized_string(&self, key: &str, _language: &str, params: &[(&str, String)]) -> String {
        let template = match EN_TEMPLATES.get(key) {
            Some(t) => *t,
            None => return key.to_string(),
        };
        let mut text = template.to_string();
        for (name, value) in params {
            text = text.replace(&format!("{{{}}}", name), value);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_params() {
        let localizer = StaticLocalizer::new();
        let text = localizer.get_localized_string(
            "finalScore",
            "fr",
            &[("points", "7".into()), ("max", "10".into()), ("percent", "70".into())],
        );
        assert_eq!(text, "Final Score: 7/10 (70%).");
    }

    #[test]
    fn test_unknown_key_is_returned() {
        let localizer = StaticLocalizer::new();
        assert_eq!(localizer.get_localized_string("nope", "en", &[]), "nope");
    }
}
