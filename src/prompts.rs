//! Prompts for vision-LLM résumé analysis.
//!
//! Every prompt lives here so wording changes touch one file and unit tests
//! can inspect the exact text sent to the provider.
//!
//! Callers can override the system prompt via
//! [`crate::config::PipelineConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// JSON shape the model must answer with. Mirrors
/// [`crate::record::AnalysisFeedback`].
pub const RESPONSE_FORMAT: &str = r#"interface Feedback {
  overallScore: number; // max 100
  ATS: {
    score: number; // rate based on ATS suitability
    tips: {
      type: "good" | "improve";
      tip: string; // give 3-4 tips
    }[];
  };
  toneAndStyle: {
    score: number; // max 100
    tips: {
      type: "good" | "improve";
      tip: string; // make it a short "title" for the actual explanation
      explanation: string; // explain in detail here
    }[]; // give 3-4 tips
  };
  content: {
    score: number; // max 100
    tips: {
      type: "good" | "improve";
      tip: string;
      explanation: string;
    }[];
  };
  structure: {
    score: number; // max 100
    tips: {
      type: "good" | "improve";
      tip: string;
      explanation: string;
    }[];
  };
  skills: {
    score: number; // max 100
    tips: {
      type: "good" | "improve";
      tip: string;
      explanation: string;
    }[];
  };
}"#;

/// Default system prompt for the analysis request.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert in ATS (Applicant Tracking System) and resume analysis.

You receive an image of the first page of a candidate's resume together with a target job.

Rules:
1. Rate the resume honestly. Low scores are acceptable when the resume is weak.
2. Base every tip on what is visible in the resume image.
3. Return ONLY a single JSON object.
   - Do NOT wrap it in ```json fences
   - Do NOT add commentary before or after the object"#;

/// Build the per-job analysis instructions from the target job's title and
/// description.
///
/// Missing fields are sent as empty strings; the model is told what the
/// target is, not asked to guess it.
pub fn analysis_instructions(job_title: &str, job_description: &str) -> String {
    format!(
        "Please analyze and rate this resume and suggest how to improve it.\n\
         The rating can be low if the resume is bad.\n\
         Be thorough and detailed. Don't be afraid to point out any mistakes or areas for improvement.\n\
         If available, use the job description for the job the user is applying to in order to give more detailed feedback.\n\
         The job title is: {job_title}\n\
         The job description is: {job_description}\n\
         Provide the feedback using the following format:\n\
         {RESPONSE_FORMAT}\n\
         Return the analysis as a JSON object, without any other text and without the backticks.\n\
         Do not include any other text or comments."
    )
}
