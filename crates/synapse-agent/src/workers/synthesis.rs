//! Synthesizes search results and extracted content into a structured
//! markdown research report, running each section through a lexical
//! text-improvement pass before assembly.

use crate::runtime::AgentWorker;
use crate::text_improve::{improve_text, LexicalImprover};
use crate::workers::context::WorkerContext;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use synapse_bus::MessageBus;
use synapse_protocol::{DataType, Envelope, LogLevel, Payload};
use synapse_tools::ToolClient;
use tracing::info;

const FAILURE_PREFIX: &str = "synthesis_failed";

pub struct SynthesisWorker {
    ctx: WorkerContext,
    improver: LexicalImprover,
}

impl SynthesisWorker {
    pub fn new(bus: Arc<dyn MessageBus>, tools: Arc<ToolClient>) -> Self {
        Self {
            ctx: WorkerContext::new("synthesis_agent", bus, tools),
            improver: LexicalImprover::default(),
        }
    }

    fn improve(&self, text: &str) -> String {
        improve_text(text, &self.improver)
    }

    fn create_introduction(query: &str) -> String {
        format!(
            "This research report investigates the question: \"{query}\". \n\n\
             The analysis draws from multiple authoritative sources to provide a comprehensive overview \
             of current developments, key findings, and implications in this rapidly evolving field. \
             Our investigation synthesizes information from academic papers, technical documentation, \
             and expert analyses to present a balanced perspective on this important topic."
        )
    }

    fn extract_key_points(content: &str) -> String {
        let key_sentences: Vec<&str> = content
            .split('.')
            .map(str::trim)
            .filter(|s| s.len() > 50)
            .take(3)
            .collect();

        if key_sentences.is_empty() {
            "• Content provides technical background and context for the research question.".to_string()
        } else {
            key_sentences.iter().map(|s| format!("• {s}.")).collect::<Vec<_>>().join("\n\n")
        }
    }

    fn create_source_analysis(content_data: &Value) -> String {
        let url = content_data.get("url").and_then(Value::as_str).unwrap_or("Unknown source");
        let title = content_data.get("title").and_then(Value::as_str).unwrap_or("Untitled");
        let content = content_data.get("content").and_then(Value::as_str).unwrap_or("");
        let word_count = content_data.get("word_count").and_then(Value::as_u64).unwrap_or(0);

        let key_points = Self::extract_key_points(content);

        format!(
            "**Source**: [{title}]({url})\n\n\
             **Content Summary** ({word_count} words):\n\n\
             {key_points}\n\n\
             **Key Insights**:\n\n\
             This source provides valuable perspective on the research question through detailed \
             analysis and evidence-based conclusions. The information contributes to our understanding \
             by offering specific insights and supporting data relevant to the investigation."
        )
    }

    fn create_conclusion(query: &str, extracted_content: &[Value]) -> String {
        let successful = extracted_content
            .iter()
            .filter(|c| c.get("extraction_successful").and_then(Value::as_bool).unwrap_or(false))
            .count();

        format!(
            "Based on our analysis of {successful} authoritative sources, several key themes emerge \
             regarding {query}:\n\n\
             **Primary Findings**:\n\n\
             • The research reveals significant developments in this field with important implications \
             for current practices and future directions.\n\n\
             • Multiple sources converge on similar conclusions, providing strong evidence for the trends \
             and patterns identified in this investigation.\n\n\
             • The evidence suggests that continued attention to this area is warranted given its \
             potential impact on related fields and applications.\n\n\
             **Implications**:\n\n\
             The synthesis of these sources demonstrates the complexity and evolving nature of this topic. \
             The convergent evidence from multiple authoritative sources provides a solid foundation for \
             understanding current developments and anticipating future trends.\n\n\
             **Future Research Directions**:\n\n\
             This analysis highlights several areas where additional investigation would be valuable to \
             further advance our understanding and address remaining questions in this important field."
        )
    }

    fn create_methodology(search_results: &[Value], extracted_content: &[Value]) -> String {
        let successful = extracted_content
            .iter()
            .filter(|c| c.get("extraction_successful").and_then(Value::as_bool).unwrap_or(false))
            .count();

        format!(
            "**Research Methodology**:\n\n\
             This report was generated through a systematic multi-stage process:\n\n\
             1. **Information Discovery**: Conducted web search yielding {} relevant sources\n\
             2. **Content Extraction**: Successfully extracted content from {successful} sources\n\
             3. **Analysis and Synthesis**: Applied structured analysis to identify key themes and insights\n\
             4. **Report Generation**: Synthesized findings into coherent narrative with supporting evidence\n\n\
             **Source Quality**: All sources were selected based on relevance and authority in the field.",
            search_results.len()
        )
    }

    fn create_metadata(search_results: &[Value], extracted_content: &[Value]) -> String {
        let successful: Vec<&Value> = extracted_content
            .iter()
            .filter(|c| c.get("extraction_successful").and_then(Value::as_bool).unwrap_or(false))
            .collect();
        let total_words: u64 = successful.iter().filter_map(|c| c.get("word_count").and_then(Value::as_u64)).sum();

        let source_list = successful
            .iter()
            .map(|c| {
                let title = c.get("title").and_then(Value::as_str).unwrap_or("Untitled");
                let url = c.get("url").and_then(Value::as_str).unwrap_or("#");
                format!("• [{title}]({url})")
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "**Research Statistics**:\n\
             - Sources Analyzed: {}\n\
             - Total Content Words: {total_words}\n\
             - Search Results: {}\n\n\
             **Sources**:\n{source_list}\n\n\
             **Generation Date**: {} UTC",
            successful.len(),
            search_results.len(),
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        )
    }

    async fn synthesize_research_report(&self, task_data: Map<String, Value>) {
        let task_id = task_data.get("task_id").and_then(Value::as_str).map(str::to_string);
        let search_results: Vec<Value> = task_data
            .get("search_results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let extracted_content: Vec<Value> = task_data
            .get("extracted_content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let Some(query) = task_data.get("query").and_then(Value::as_str).map(str::to_string) else {
            self.ctx
                .send_failure_status(FAILURE_PREFIX, "No research query provided for synthesis", task_id)
                .await;
            return;
        };

        info!(query, "starting synthesis");
        self.ctx.send_status("synthesis_starting", Some(10.0), task_id.clone()).await;

        let mut sections = Vec::new();

        self.ctx.send_status("creating_introduction", Some(20.0), task_id.clone()).await;
        let intro = self.improve(&Self::create_introduction(&query));
        sections.push(format!("## Introduction\n\n{intro}"));

        self.ctx.send_status("analyzing_sources", Some(40.0), task_id.clone()).await;
        for (i, content) in extracted_content.iter().enumerate() {
            if content.get("extraction_successful").and_then(Value::as_bool).unwrap_or(false) {
                let section = self.improve(&Self::create_source_analysis(content));
                sections.push(format!("## Source {} Analysis\n\n{section}", i + 1));
            }
        }

        self.ctx.send_status("creating_synthesis", Some(70.0), task_id.clone()).await;
        let conclusion = self.improve(&Self::create_conclusion(&query, &extracted_content));
        sections.push(format!("## Synthesis and Conclusions\n\n{conclusion}"));

        self.ctx.send_status("adding_metadata", Some(90.0), task_id.clone()).await;
        let methodology = Self::create_methodology(&search_results, &extracted_content);
        sections.push(format!("## Research Methodology\n\n{methodology}"));

        let mut full_report = format!("# Research Report: {query}\n\n{}", sections.join("\n\n"));
        let metadata = Self::create_metadata(&search_results, &extracted_content);
        full_report.push_str(&format!("\n\n## Research Metadata\n\n{metadata}"));

        let word_count = full_report.split_whitespace().count();
        let sources_analyzed = extracted_content
            .iter()
            .filter(|c| c.get("extraction_successful").and_then(Value::as_bool).unwrap_or(false))
            .count();

        info!(word_count, "synthesis completed");
        self.ctx.send_status("synthesis_complete", Some(100.0), task_id.clone()).await;

        let data = json!({
            "report_content": full_report,
            "word_count": word_count,
            "sections": sections.len(),
            "sources_analyzed": sources_analyzed,
            "query": query,
        });
        self.ctx.submit_data(DataType::SynthesisReport, data, "synthesis_engine", task_id).await;

        self.ctx
            .log(
                LogLevel::Info,
                format!("Research report synthesized: {word_count} words, {} sources", extracted_content.len()),
            )
            .await;
    }
}

#[async_trait]
impl AgentWorker for SynthesisWorker {
    fn agent_id(&self) -> &str {
        self.ctx.agent_id()
    }

    async fn handle(&self, envelope: Envelope) {
        if let Payload::TaskAssign(task) = envelope.payload() {
            if task.task_type == "synthesize_research" {
                self.synthesize_research_report(task.task_data.clone()).await;
            }
        }
    }
}
