//! Recruiter prompts and the versioned question sets asked of every resume.

pub const SCORE_QUESTION_KEY: &str = "q3";
pub const DEFAULT_PROMPT_SET: &str = "v2";

pub const RECRUITER_SYSTEM_PROMPT: &str = "\
    Act as a senior technical recruiter: fair, strict, analytical and meticulous. \
    Your goal is to assess the candidate's resume against the job description. \
    Answer using ONLY the resume context you are given. \
    If the information is not in the context, explicitly answer \"Not mentioned in resume\" \
    instead of guessing. Give a professional assessment grounded in that context.";

/// Wraps a job description so it can prefix every question.
pub fn jd_as_context(job_description: &str) -> String {
    format!("Based on this Job Description: \n\n {job_description} \n\n Answer this: ")
}

/// Query text used both for retrieval and as the question shown to the model.
pub fn build_query(job_description: &str, question: &str) -> String {
    format!("{}\n\n{}", jd_as_context(job_description), question.trim())
}

pub fn build_user_prompt(context: &str, query: &str) -> String {
    format!("Context (resume segments):\n{context}\n\nUser query:\n{query}")
}

/// Ordered questions, keyed `q1`..`q9`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub version: &'static str,
    pub questions: Vec<(&'static str, &'static str)>,
}

impl PromptSet {
    pub fn question(&self, key: &str) -> Option<&'static str> {
        self.questions
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, text)| *text)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.questions.iter().map(|(key, _)| *key)
    }
}

pub fn prompt_set(version: &str) -> Option<PromptSet> {
    let (version, questions) = match version {
        "v1" => ("v1", V1),
        "v2" => ("v2", V2),
        _ => return None,
    };
    Some(PromptSet {
        version,
        questions: questions.to_vec(),
    })
}

pub fn available_prompt_sets() -> [&'static str; 2] {
    ["v1", "v2"]
}

const V1: [(&str, &str); 9] = [
    ("q1", "Does the candidate meet the required skills?"),
    ("q2", "Is the candidate a good fit for the job position?"),
    (
        "q3",
        "Evaluate the candidate resume against the job description. Respond with ONLY a number \
         that represents the overall match percentage between 0 and 100.",
    ),
    ("q4", "Analyze the candidate's strengths for the job position."),
    (
        "q5",
        "Analyze the candidate's opportunities to improve based on the job description.",
    ),
    ("q6", "Analyze the candidate's weaknesses based on the job description."),
    (
        "q7",
        "Create a cover letter tailored to this job. Use the resume to fill in details such as \
         the candidate's name and contact information.",
    ),
    ("q8", "Suggest ways to stand out for this specific role."),
    (
        "q9",
        "Using the STAR framework, speak as the candidate and put together a short speech based on \
         the resume and the job description requirements.",
    ),
];

const V2: [(&str, &str); 9] = [
    (
        "q1",
        "Analyze the Job Description to identify the top 5 essential technical skills.\n\
         Create a Markdown table with three columns:\n\
         1. Required Skill\n\
         2. Candidate Match (Yes/No/Partial)\n\
         3. Evidence from Resume (quote the specific project or role)",
    ),
    (
        "q2",
        "Based on the analysis, summarize the candidate's fit.\n\
         Start with a bold \"Fit Decision: [High/Medium/Low]\".\n\
         Follow with a 3-sentence justification naming the key reason for this decision.",
    ),
    (
        "q3",
        "Evaluate the match percentage based on skills and experience overlap.\n\
         Output ONLY the integer number between 0 and 100.\n\
         Do not output the % sign. Do not output any text or explanation. Just the number.",
    ),
    (
        "q4",
        "Identify the candidate's top 3 \"Selling Points\" for this specific role.\n\
         These should be unique strengths (certifications, years of experience with a niche tool, \
         impressive metrics) that align with the job description. Use bullet points.",
    ),
    (
        "q5",
        "Identify 2 specific areas where the candidate could improve their profile to better \
         match this job description.\n\
         Focus on skills or certifications in the job description that are missing or weak in \
         the resume, and give actionable advice (e.g. \"Gain certification in AWS\").",
    ),
    (
        "q6",
        "Identify any potential \"Red Flags\" or critical missing requirements \
         (short tenures, a missing required degree, lack of must-have experience). Be critical.",
    ),
    (
        "q7",
        "Draft a cover letter for this specific job application.\n\
         - Structure: standard business letter format.\n\
         - Tone: confident, professional and enthusiastic.\n\
         - Content: use the candidate's real name and contact info from the resume header and \
         highlight the 2 most relevant projects that solve problems named in the job description.",
    ),
    (
        "q8",
        "Based on the company's requirements, suggest 3 creative ways the candidate can stand out \
         during the interview process (e.g. \"Bring a portfolio showing your X project\").",
    ),
    (
        "q9",
        "Using the STAR method (Situation, Task, Action, Result), draft a 2-minute \"Elevator \
         Pitch\" for the candidate to open an interview with.\n\
         The pitch should answer \"Tell me about yourself\" by weaving the resume experience and \
         matched skills into a narrative that proves the candidate fits THIS job description.",
    ),
];
