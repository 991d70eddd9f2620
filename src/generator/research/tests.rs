#[cfg(test)]
mod tests {
    use crate::error::ResearchError;
    use crate::generator::outlet::WorkflowEvent;
    use crate::generator::research::ResearchWorkflow;
    use crate::generator::scheduler::{CancelToken, SectionHandles};
    use crate::generator::testing::{ScriptedModel, ScriptedSearch, test_config, test_context};
    use crate::types::{SearchHit, Section, Stage};
    use serde_json::json;
    use std::sync::Arc;

    fn section() -> Section {
        Section::new("Kernels", vec!["kernel trick".into(), "common kernels".into()])
    }

    #[tokio::test]
    async fn test_accept_on_first_reflection_runs_one_cycle() {
        let search = Arc::new(ScriptedSearch::new());
        let (context, sink) = test_context(ScriptedModel::new(), search.clone(), test_config());

        let run = ResearchWorkflow
            .run(&context, 0, &section(), &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(run.workspace.reflection_iteration_count, 0);
        assert_eq!(context.llm.calls(Stage::KnowledgeSeed), 1);
        assert_eq!(context.llm.calls(Stage::QueryGenerator), 1);
        assert_eq!(context.llm.calls(Stage::ReflectionGate), 1);
        assert_eq!(context.llm.calls(Stage::FinalSectionFormatter), 1);

        // 模型给出3条查询，按 max_queries=2 截断
        assert_eq!(run.workspace.generated_queries.len(), 2);
        assert_eq!(run.workspace.search_results_history.len(), 2);
        assert_eq!(search.queries().len(), 2);

        assert_eq!(run.content.section_index, 0);
        assert!(run.content.text.starts_with("## Kernels"));
        assert!(!run.content.placeholder);
        assert_eq!(run.workspace.knowledge, "Background knowledge on Kernels");

        let stages: Vec<Stage> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::StageCompleted { stage, .. } => Some(stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                Stage::KnowledgeSeed,
                Stage::QueryGenerator,
                Stage::SearchExecutor,
                Stage::ResultAccumulator,
                Stage::FinalSectionFormatter,
            ]
        );
    }

    #[tokio::test]
    async fn test_always_revise_is_force_accepted_at_cap() {
        let mut config = test_config();
        config.research.num_reflections = 2;
        let model = ScriptedModel::new().with_verdicts(
            "Kernels",
            vec![
                json!({ "feedback": "missing RBF" }),
                json!({ "feedback": "missing polynomial" }),
                json!({ "feedback": "still thin" }),
                json!({ "feedback": "never used" }),
            ],
        );
        let (context, sink) = test_context(model, Arc::new(ScriptedSearch::new()), config);

        let run = ResearchWorkflow
            .run(&context, 3, &section(), &CancelToken::never())
            .await
            .unwrap();

        // 计数从0开始，达到上限2时强制接受：共3轮
        assert_eq!(run.workspace.reflection_iteration_count, 2);
        assert_eq!(context.llm.calls(Stage::ReflectionGate), 3);
        assert_eq!(context.llm.calls(Stage::QueryGenerator), 3);
        assert_eq!(context.llm.calls(Stage::FinalSectionFormatter), 1);
        assert_eq!(run.workspace.searched_queries_history.len(), 6);
        assert_eq!(run.workspace.search_results_history.len(), 6);

        let forced: Vec<bool> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::ReflectionVerdict { forced, .. } => Some(forced),
                _ => None,
            })
            .collect();
        assert_eq!(forced, vec![false, false, true]);
    }

    #[tokio::test]
    async fn test_feedback_and_history_reach_next_query_prompt() {
        let model = ScriptedModel::new().with_verdicts(
            "Kernels",
            vec![json!({ "feedback": "cover the RBF kernel" }), json!({ "feedback": true })],
        );
        let (context, _sink) = test_context(model, Arc::new(ScriptedSearch::new()), test_config());

        let run = ResearchWorkflow
            .run(&context, 0, &section(), &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(run.workspace.reflection_iteration_count, 1);

        let prompts = context.llm.prompts(Stage::QueryGenerator);
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].prompt_user.contains("first pass"));
        assert!(prompts[1].prompt_user.contains("cover the RBF kernel"));
        assert!(prompts[1].prompt_user.contains("Kernels query 1.1"));
        assert!(prompts[0].prompt_sys.contains("at most 2 queries"));
    }

    #[tokio::test]
    async fn test_incomplete_hits_are_dropped_but_results_kept() {
        let search = Arc::new(ScriptedSearch::new().with_hits(vec![
            SearchHit::new("https://a.example", "A", "alpha"),
            SearchHit {
                url: None,
                title: Some("B".into()),
                content: Some("beta".into()),
            },
            SearchHit::new("https://c.example", "C", "gamma"),
        ]));
        let (context, _sink) = test_context(ScriptedModel::new(), search, test_config());

        let run = ResearchWorkflow
            .run(&context, 0, &section(), &CancelToken::never())
            .await
            .unwrap();

        for result in &run.workspace.search_results_history {
            assert_eq!(result.raw_content, vec!["alpha", "gamma"]);
        }
        let urls: Vec<String> = run.workspace.sources().into_iter().map(|s| s.url).collect();
        assert_eq!(urls, vec!["https://a.example", "https://c.example"]);

        let accumulator = &context.llm.prompts(Stage::ResultAccumulator)[0];
        assert!(accumulator.prompt_user.contains("alpha"));
        assert!(!accumulator.prompt_user.contains("beta"));
    }

    #[tokio::test]
    async fn test_search_transport_failure_is_fatal_to_section() {
        let search = Arc::new(ScriptedSearch::new().failing_on("Kernels"));
        let (context, _sink) = test_context(ScriptedModel::new(), search, test_config());

        let err = ResearchWorkflow
            .run(&context, 0, &section(), &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResearchError>(),
            Some(ResearchError::Stage { stage: Stage::SearchExecutor, .. })
        ));
        assert_eq!(context.llm.calls(Stage::FinalSectionFormatter), 0);
    }

    #[tokio::test]
    async fn test_malformed_queries_become_schema_violation() {
        let mut config = test_config();
        config.research.schema_retries = 0;
        let model = ScriptedModel::new().with_malformed(Stage::QueryGenerator, 1);
        let (context, _sink) = test_context(model, Arc::new(ScriptedSearch::new()), config);

        let err = ResearchWorkflow
            .run(&context, 0, &section(), &CancelToken::never())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("query_generator"));
        assert!(message.contains("Kernels"));
    }

    #[tokio::test]
    async fn test_cancelled_section_stops_before_any_stage() {
        let handles = SectionHandles::new();
        handles.cancel(0);
        let (context, _sink) = test_context(
            ScriptedModel::new(),
            Arc::new(ScriptedSearch::new()),
            test_config(),
        );

        let err = ResearchWorkflow
            .run(&context, 0, &section(), &handles.token(0))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResearchError>(),
            Some(ResearchError::Cancelled { .. })
        ));
        assert_eq!(context.llm.calls(Stage::KnowledgeSeed), 0);
    }
}
