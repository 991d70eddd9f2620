use crate::config::LLMConfig;

/// 长上下文阈值，超过时直接使用高质量模型
const EFFICIENT_CONTEXT_LIMIT: usize = 32 * 1024;

/// 根据上下文长度选择模型，返回（首选模型，兜底模型）
pub fn evaluate_befitting_model(
    llm_config: &LLMConfig,
    system_prompt: &str,
    user_prompt: &str,
) -> (String, Option<String>) {
    if system_prompt.len() + user_prompt.len() <= EFFICIENT_CONTEXT_LIMIT
        && llm_config.model_efficient != llm_config.model_powerful
    {
        return (
            llm_config.model_efficient.clone(),
            Some(llm_config.model_powerful.clone()),
        );
    }
    if system_prompt.len() + user_prompt.len() <= EFFICIENT_CONTEXT_LIMIT {
        return (llm_config.model_efficient.clone(), None);
    }
    (llm_config.model_powerful.clone(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_prompt_prefers_efficient_with_fallover() {
        let config = LLMConfig::default();
        let (model, fallover) = evaluate_befitting_model(&config, "sys", "user");
        assert_eq!(model, config.model_efficient);
        assert_eq!(fallover, Some(config.model_powerful.clone()));
    }

    #[test]
    fn test_long_prompt_uses_powerful() {
        let config = LLMConfig::default();
        let long = "x".repeat(40 * 1024);
        let (model, fallover) = evaluate_befitting_model(&config, "sys", &long);
        assert_eq!(model, config.model_powerful);
        assert!(fallover.is_none());
    }

    #[test]
    fn test_same_models_have_no_fallover() {
        let mut config = LLMConfig::default();
        config.model_powerful = config.model_efficient.clone();
        let (_, fallover) = evaluate_befitting_model(&config, "sys", "user");
        assert!(fallover.is_none());
    }
}
