use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::api::options::{
    AnswerModel, AnswerRequest, ContentsOptions, ContentsRequest, ContextOptions, ContextRequest,
    ExtrasOptions, FindSimilarRequest, HighlightsOptions, Livecrawl, ResultFilters, SearchRequest,
    SearchType, SubpageTarget, SummaryOptions, TextOptions, Toggle, TokensNum,
};
use crate::error::Result;
use crate::input::{read_arg_or_file, read_json_file};
use crate::research::{CreateTask, PollOptions, ResearchModel};

#[derive(Debug, Parser)]
#[command(name = "exa-direct", author, version, about = "Direct Exa API CLI")]
pub struct Cli {
    #[arg(long, global = true, help = "Override EXA_API_KEY")]
    pub api_key: Option<String>,

    #[arg(long, global = true, help = "Pretty-print JSON output")]
    pub pretty: bool,

    #[arg(long, global = true, help = "Also write the JSON result to this file")]
    pub save: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search the web
    Search(SearchArgs),
    /// Fetch page contents by URL
    Contents(ContentsCmdArgs),
    /// Find pages similar to a URL
    FindSimilar(FindSimilarArgs),
    /// Answer a question with citations
    Answer(AnswerArgs),
    /// Long-running research tasks
    #[command(subcommand)]
    Research(ResearchCommand),
    /// Code context API
    #[command(subcommand)]
    Context(ContextCommand),
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(long)]
    pub query: String,

    #[arg(long = "type", value_enum)]
    pub search_type: Option<SearchType>,

    #[arg(long)]
    pub num_results: Option<u32>,

    #[command(flatten)]
    pub filters: FilterArgs,

    #[arg(long)]
    pub user_location: Option<String>,

    #[arg(long)]
    pub moderation: bool,

    #[arg(long)]
    pub use_autoprompt: bool,

    #[command(flatten)]
    pub contents: ContentsArgs,
}

#[derive(Debug, Args)]
pub struct ContentsCmdArgs {
    #[arg(required = true)]
    pub urls: Vec<String>,

    #[command(flatten)]
    pub contents: ContentsArgs,
}

#[derive(Debug, Args)]
pub struct FindSimilarArgs {
    #[arg(long)]
    pub url: String,

    #[arg(long)]
    pub num_results: Option<u32>,

    #[arg(long)]
    pub exclude_source_domain: bool,

    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub contents: ContentsArgs,
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    #[arg(long, num_args = 1..)]
    pub include_domains: Vec<String>,

    #[arg(long, num_args = 1..)]
    pub exclude_domains: Vec<String>,

    #[arg(long, help = "Published date lower bound (YYYY-MM-DD)")]
    pub start_published_date: Option<String>,

    #[arg(long, help = "Published date upper bound (YYYY-MM-DD)")]
    pub end_published_date: Option<String>,

    #[arg(long, help = "Crawl date lower bound (YYYY-MM-DD)")]
    pub start_crawl_date: Option<String>,

    #[arg(long, help = "Crawl date upper bound (YYYY-MM-DD)")]
    pub end_crawl_date: Option<String>,

    #[arg(long, num_args = 1.., help = "Terms that must appear in the text")]
    pub include_text: Vec<String>,

    #[arg(long, num_args = 1.., help = "Terms that must not appear in the text")]
    pub exclude_text: Vec<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long, num_args = 1..)]
    pub flags: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ContentsArgs {
    #[arg(long, help = "Include full text")]
    pub text: bool,

    #[arg(long)]
    pub text_max_characters: Option<u32>,

    #[arg(long)]
    pub text_include_html_tags: bool,

    #[arg(long)]
    pub highlights: bool,

    #[arg(long)]
    pub highlights_num_sentences: Option<u32>,

    #[arg(long)]
    pub highlights_per_url: Option<u32>,

    #[arg(long)]
    pub highlights_query: Option<String>,

    #[arg(long)]
    pub summary_query: Option<String>,

    #[arg(long, help = "Path to a JSON Schema for the summary")]
    pub summary_schema: Option<PathBuf>,

    #[arg(long)]
    pub subpages: Option<u32>,

    #[arg(long, help = "Subpage target, or a comma-separated list")]
    pub subpage_target: Option<String>,

    #[arg(long)]
    pub extras_links: Option<u32>,

    #[arg(long)]
    pub extras_image_links: Option<u32>,

    #[arg(long)]
    pub context: bool,

    #[arg(long)]
    pub context_max_characters: Option<u32>,

    #[arg(long, value_enum, help = "Livecrawl freshness preference")]
    pub livecrawl: Option<Livecrawl>,

    #[arg(long)]
    pub livecrawl_timeout: Option<u64>,

    #[arg(long)]
    pub filter_empty_results: bool,

    #[arg(long, num_args = 1..)]
    pub contents_flags: Vec<String>,
}

#[derive(Debug, Args)]
pub struct AnswerArgs {
    #[arg(long)]
    pub query: String,

    #[arg(long, help = "Include citation text")]
    pub include_text: bool,

    #[arg(long, help = "Stream the answer as it is generated")]
    pub stream: bool,

    #[arg(long, requires = "stream", help = "When streaming, emit JSON lines")]
    pub json_lines: bool,

    #[arg(long, value_enum)]
    pub model: Option<AnswerModel>,

    #[arg(long)]
    pub system_prompt: Option<String>,

    #[arg(long, help = "Path to a JSON Schema for structured answers")]
    pub output_schema: Option<PathBuf>,

    #[arg(long)]
    pub user_location: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ResearchCommand {
    /// Create a research task
    Start(ResearchStartArgs),
    /// Fetch a research task
    Get(ResearchGetArgs),
    /// List research tasks, newest first
    List(ResearchListArgs),
    /// Wait until a task finishes
    Poll(ResearchPollArgs),
    /// Stream task events as JSON lines
    Stream(ResearchIdArgs),
}

#[derive(Debug, Args)]
pub struct ResearchStartArgs {
    #[arg(long, help = "Instructions text, or @path to read them from a file")]
    pub instructions: String,

    #[arg(long, value_enum, default_value_t = ResearchModel::Fast)]
    pub model: ResearchModel,

    #[arg(long, help = "Path to a JSON Schema for structured output")]
    pub schema: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ResearchIdArgs {
    #[arg(long)]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct ResearchGetArgs {
    #[arg(long)]
    pub id: String,

    #[arg(long, help = "Include the event log")]
    pub events: bool,
}

#[derive(Debug, Args)]
pub struct ResearchListArgs {
    #[arg(long, help = "Page size (1-50)")]
    pub limit: Option<u32>,

    #[arg(long, help = "Cursor from a previous page")]
    pub cursor: Option<String>,
}

#[derive(Debug, Args)]
pub struct ResearchPollArgs {
    #[arg(long)]
    pub id: String,

    #[arg(
        long,
        value_enum,
        help = "Poll interval preset: fast 10s, balanced 30s, thorough 40s"
    )]
    pub preset: Option<ResearchModel>,

    #[arg(long, value_parser = humantime::parse_duration, help = "Overrides the preset interval")]
    pub interval: Option<Duration>,

    #[arg(
        long,
        value_parser = humantime::parse_duration,
        default_value = "15m"
    )]
    pub timeout: Duration,

    #[arg(long, help = "Include the event log in the final task")]
    pub events: bool,
}

#[derive(Debug, Subcommand)]
pub enum ContextCommand {
    /// Query for code examples and context
    Query(ContextQueryArgs),
}

#[derive(Debug, Args)]
pub struct ContextQueryArgs {
    #[arg(long)]
    pub query: String,

    #[arg(long = "tokens-num", alias = "tokensNum", help = "\"dynamic\" or a token count")]
    pub tokens_num: Option<TokensNum>,
}

impl ContentsArgs {
    /// `None` when no contents flag was given.
    pub fn to_options(&self) -> Result<Option<ContentsOptions>> {
        let mut options = ContentsOptions::default();

        if self.text_max_characters.is_some() || self.text_include_html_tags {
            options.text = Some(Toggle::With(TextOptions {
                max_characters: self.text_max_characters,
                include_html_tags: self.text_include_html_tags,
            }));
        } else if self.text {
            options.text = Some(Toggle::Enabled(true));
        }

        let highlights = HighlightsOptions {
            num_sentences: self.highlights_num_sentences,
            highlights_per_url: self.highlights_per_url,
            query: self.highlights_query.clone(),
        };
        if !highlights.is_empty() {
            options.highlights = Some(Toggle::With(highlights));
        } else if self.highlights {
            options.highlights = Some(Toggle::Enabled(true));
        }

        if self.summary_query.is_some() || self.summary_schema.is_some() {
            let schema = self
                .summary_schema
                .as_deref()
                .map(read_json_file)
                .transpose()?;
            options.summary = Some(SummaryOptions {
                query: self.summary_query.clone(),
                schema,
            });
        }

        options.subpages = self.subpages;
        options.subpage_target = self.subpage_target.as_deref().and_then(SubpageTarget::parse);

        if self.extras_links.is_some() || self.extras_image_links.is_some() {
            options.extras = Some(ExtrasOptions {
                links: self.extras_links,
                image_links: self.extras_image_links,
            });
        }

        if self.context_max_characters.is_some() {
            options.context = Some(Toggle::With(ContextOptions {
                max_characters: self.context_max_characters,
            }));
        } else if self.context {
            options.context = Some(Toggle::Enabled(true));
        }

        options.livecrawl = self.livecrawl;
        options.livecrawl_timeout = self.livecrawl_timeout;
        options.filter_empty_results = self.filter_empty_results;
        options.flags = self.contents_flags.clone();

        Ok((!options.is_empty()).then_some(options))
    }
}

impl FilterArgs {
    pub fn to_filters(&self) -> ResultFilters {
        ResultFilters {
            include_domains: self.include_domains.clone(),
            exclude_domains: self.exclude_domains.clone(),
            start_published_date: self.start_published_date.clone(),
            end_published_date: self.end_published_date.clone(),
            start_crawl_date: self.start_crawl_date.clone(),
            end_crawl_date: self.end_crawl_date.clone(),
            include_text: self.include_text.clone(),
            exclude_text: self.exclude_text.clone(),
            category: self.category.clone(),
            flags: self.flags.clone(),
        }
    }
}

impl SearchArgs {
    pub fn to_request(&self) -> Result<SearchRequest> {
        Ok(SearchRequest {
            query: self.query.clone(),
            search_type: self.search_type,
            num_results: self.num_results,
            filters: self.filters.to_filters(),
            user_location: self.user_location.clone(),
            moderation: self.moderation,
            use_autoprompt: self.use_autoprompt,
            contents: self.contents.to_options()?,
        })
    }
}

impl ContentsCmdArgs {
    pub fn to_request(&self) -> Result<ContentsRequest> {
        Ok(ContentsRequest {
            urls: self.urls.clone(),
            options: self.contents.to_options()?.unwrap_or_default(),
        })
    }
}

impl FindSimilarArgs {
    pub fn to_request(&self) -> Result<FindSimilarRequest> {
        Ok(FindSimilarRequest {
            url: self.url.clone(),
            num_results: self.num_results,
            exclude_source_domain: self.exclude_source_domain,
            filters: self.filters.to_filters(),
            contents: self.contents.to_options()?,
        })
    }
}

impl AnswerArgs {
    pub fn to_request(&self) -> Result<AnswerRequest> {
        let output_schema = self
            .output_schema
            .as_deref()
            .map(read_json_file)
            .transpose()?;
        Ok(AnswerRequest {
            query: self.query.clone(),
            text: self.include_text,
            model: self.model,
            system_prompt: self.system_prompt.clone(),
            output_schema,
            user_location: self.user_location.clone(),
        })
    }
}

impl ResearchStartArgs {
    pub fn to_request(&self) -> Result<CreateTask> {
        let instructions = read_arg_or_file(&self.instructions)?;
        let mut request = CreateTask::new(instructions, self.model);
        if let Some(path) = &self.schema {
            request = request.with_output_schema(read_json_file(path)?);
        }
        Ok(request)
    }
}

impl ResearchPollArgs {
    pub fn to_options(&self) -> PollOptions {
        let interval = self
            .interval
            .unwrap_or_else(|| self.preset.unwrap_or_default().poll_interval());
        PollOptions::new(interval, self.timeout).with_events(self.events)
    }
}

impl ContextQueryArgs {
    pub fn to_request(&self) -> ContextRequest {
        ContextRequest {
            query: self.query.clone(),
            tokens_num: self.tokens_num,
        }
    }
}
