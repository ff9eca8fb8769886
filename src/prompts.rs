//! Elicitation prompts, one template per question type.
//!
//! All builders are pure: the caller supplies the research brief and the
//! date stamp, so the same inputs always produce the same prompt.

use chrono::NaiveDate;

use crate::question::{BinaryQuestion, MultipleChoiceQuestion, NumericQuestion, QuestionDetails};

const ROLE: &str = "You are a professional forecaster interviewing for a job.";

const PRECISION: &str = "1% precision
You commit to forecast with 1% precision. This means you do not preferentially choose forecast probabilities
of 5%, 10%, 15%, 20% etc. Instead you make your best forecast, allowing values such as 12%, 17%, 34%, 48%, 71%...
Particularly when aggregating several forecasts, this may result in a more accurate overall forecast.";

const EVIDENCE_BUCKETS: &str = "Review the evidence from your research assistant and group it into three buckets of approximately the same size:
Bucket 1) Evidence that would indicate a relatively low forecast
Bucket 2) Evidence that would indicate a relatively high forecast
Bucket 3) Evidence that would indicate a central forecast";

const WORLDS: &str = "1) Low_World: review the bucket 1 evidence from your research assistant that the forecast could be low.
- What would an appropriate base rate be for this world?
- What would be a low forecast estimate for this world?
- What would be a mid forecast estimate for this world?
- What would be a high forecast estimate for this world?
2) High_World: review the bucket 2 evidence from your research assistant that the forecast could be high.
- What would an appropriate base rate be for this world?
- What would be a low forecast estimate for this world?
- What would be a mid forecast estimate for this world?
- What would be a high forecast estimate for this world?
3) Mid_World: review the bucket 3 evidence from your research assistant that the forecast could be around the central views and trends.
- What would an appropriate base rate be for this world?
- What would be a low forecast estimate for this world?
- What would be a mid forecast estimate for this world?
- What would be a high forecast estimate for this world?";

const REFERENCE_CSV: &str = "Headings: World_name, Base rate, Low Forecast, Mid Forecast, High Forecast
Rows: Low_World, Mid_World, High_World";

const SEPARATOR: &str = "************";

/// Percentile ranks requested from the model for numeric questions
pub const REQUESTED_PERCENTILES: [u8; 7] = [10, 20, 40, 50, 60, 80, 90];

const UNSTATED_UNITS: &str = "Not stated (please infer this)";

fn date_stamp(today: NaiveDate) -> String {
    format!("Today is {}.", today.format("%Y-%m-%d"))
}

fn research_block(research: &str) -> String {
    format!("Your research assistant says:\n{}", research.trim())
}

/// Options rendered as a bracketed, quoted list in question order
fn option_list(options: &[String]) -> String {
    let quoted: Vec<String> = options.iter().map(|o| format!("'{}'", o)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Joins prompt sections with blank lines, dropping empty ones
fn assemble(sections: &[&str]) -> String {
    sections
        .iter()
        .map(|s| s.trim_end())
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn question_header(details: &QuestionDetails) -> String {
    format!("Your interview question is:\n{}", details.question_text)
}

pub fn binary_prompt(question: &BinaryQuestion, research: &str, today: NaiveDate) -> String {
    let d = &question.details;
    let background = format!("Question background:\n{}", d.background_info);
    let criteria = format!(
        "This question's outcome will be determined by the specific criteria below. These criteria have not yet been satisfied:\n{}",
        d.resolution_criteria
    );
    let before = "Before answering you write:
(a) The time left until the outcome to the question is known.
(b) The status quo outcome if nothing changed.
(c) The expectations of experts and markets.
(d) A brief description of a scenario that results in a No outcome.
(e) A brief description of a scenario that results in a Yes outcome.

You write your rationale remembering that good forecasters put extra weight on the status quo outcome since the world changes slowly most of the time.";
    let buckets = format!("{}\nGroup the evidence\n{}", SEPARATOR, EVIDENCE_BUCKETS);
    let worlds = format!(
        "{}\nMulti-world considerations\nNow you want to explore ranges of reasonable, possible forecasts, aiming for 1% precision.\nYou consider three worlds:\n{}",
        SEPARATOR, WORLDS
    );
    let csv = format!(
        "{}\nReference CSV\nNow, for future reference, make a CSV based on values from your multi-world reasoning.\n{}",
        SEPARATOR, REFERENCE_CSV
    );
    let synthesis = format!(
        "{}\nFinal expected distribution of reasonable forecasts
You order the 9 estimates from low to high because you know that these values represent a range of reasonable forecasts.

Considering the 9 estimates ordered from low to high:
- Project a distribution of reasonable forecasts
- Make a CSV with percentiles of probability from P10 to P90 on increments of 10
- Reflect on the 50th percentile and adjust as necessary
- The 50th percentile is a good estimate of forecast probability, but you modify your final answer based on your analysis
{}",
        SEPARATOR, SEPARATOR
    );
    let answer = "The last thing you write is your final answer as: \"Probability: ZZ%\", 0-100";

    assemble(&[
        ROLE,
        &question_header(d),
        &background,
        &criteria,
        &d.fine_print,
        &research_block(research),
        &date_stamp(today),
        PRECISION,
        before,
        &buckets,
        &worlds,
        &csv,
        &synthesis,
        answer,
    ])
}

pub fn multiple_choice_prompt(
    question: &MultipleChoiceQuestion,
    research: &str,
    today: NaiveDate,
) -> String {
    let d = &question.details;
    let options = option_list(&question.options);
    let n = question.options.len();
    let listed = format!("The options are:\n{}", options);
    let background = format!("Background:\n{}", d.background_info);
    let before = "Before answering you write:
(a) The time left until the outcome to the question is known.
(b) The status quo outcome if nothing changed.
(c) The expectations of experts and markets.

You write your rationale remembering that (1) good forecasters put extra weight on the status quo outcome
since the world changes slowly most of the time, and (2) good forecasters leave some moderate probability
on most options to account for unexpected outcomes.";
    let per_option = format!(
        "{sep}
There are {n} options in this question, in this order:
{options}

At this stage, you treat each option as an independent, binary question.

For each option you conduct the following steps:

You write:
- The status quo outcome if nothing changed for the option.
- The expectations of experts and markets for the option.
- A brief description of a scenario that results in a No outcome for the option.
- A brief description of a scenario that results in a Yes outcome for the option.

Group the evidence for the option
{buckets}

Multi-world considerations for the option
Now you want to explore ranges of reasonable possible forecasts. You consider three worlds:
{worlds}

Reference Table for the option
Now, for future reference, make a CSV based on values from your multi-world reasoning around the option.
{csv}

You order the 9 estimates for the option from low to high because you know that these values represent a
range of reasonable forecasts.

Considering the 9 estimates ordered from low to high for the option
- You use your judgment to make a table with percentiles of probability
  from P10 to P90 on increments of 10
- The 50th percentile is your preliminary estimate of probability for the option",
        sep = SEPARATOR,
        n = n,
        options = options,
        buckets = EVIDENCE_BUCKETS,
        worlds = WORLDS,
        csv = REFERENCE_CSV,
    );
    let consolidate = format!(
        "{}\nConsolidate and adjust the multiple choice option forecasts

Sort the option probabilities from highest to lowest and reflect on:
- The options should sum to 100%
- Does the relative probability of each option make sense?
- Does the status quo impact the probability?
- Does evidence suggest moving away from the status quo?
- Does the evidence indicate the preliminary probability should be adjusted?",
        SEPARATOR
    );
    let answer_lines: Vec<String> = question
        .options
        .iter()
        .map(|o| format!("{}: Probability_{}", o, o))
        .collect();
    let answer = format!(
        "{}\nFinal forecast

You make your final and best forecast using any adjustments after reflection and remembering to report at 1% or
better precision.

The last thing you write is your final probabilities for the {} options in this order {} as:
{}",
        SEPARATOR,
        n,
        options,
        answer_lines.join("\n")
    );

    assemble(&[
        ROLE,
        &question_header(d),
        &listed,
        &background,
        &d.resolution_criteria,
        &d.fine_print,
        &research_block(research),
        &date_stamp(today),
        PRECISION,
        before,
        &per_option,
        &consolidate,
        &answer,
    ])
}

pub fn numeric_prompt(question: &NumericQuestion, research: &str, today: NaiveDate) -> String {
    let d = &question.details;
    let (upper, lower) = question.bound_messages();
    let units = format!(
        "Units for answer: {}\nYou write Units for the answer are: (whatever units you determined)",
        question
            .unit_of_measure
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(UNSTATED_UNITS)
    );
    let background = format!("Background:\n{}", d.background_info);
    let bounds = [lower, upper]
        .into_iter()
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let formatting = "Formatting Instructions:
- Please notice the units requested (e.g. whether you represent a number as 1,000,000 or 1 million).
- Never use scientific notation.
- Always start with a smaller number (more negative if negative) and then increase from there";
    let before = "Before answering you write:
(a) The time left until the outcome to the question is known.
(b) The outcome if nothing changed.
(c) The outcome if the current trend continued.
(d) The expectations of experts and markets.
(e) A brief description of an unexpected scenario that results in a low outcome.
(f) A brief description of an unexpected scenario that results in a high outcome.

You remind yourself that good forecasters are humble and set wide 90/10 confidence intervals to account for unknown unknowns.";
    let buckets = format!("{}\nGroup the evidence\n{}", SEPARATOR, EVIDENCE_BUCKETS);
    let verify = format!(
        "{}\nVerify the Units for the answer, and write them here
You check that those are the same units used above in questions (a), (b), (c), (d), (e), and (f)
If the units are in agreement write \"units confirmed\"",
        SEPARATOR
    );
    let worlds = format!(
        "{}\nMulti-world considerations
For this section, you are careful to report values in the confirmed units for answer
You want to explore ranges of reasonable possibilities. You consider three worlds:
{}",
        SEPARATOR, WORLDS
    );
    let csv = format!(
        "{}\nReference CSV\nNow, for future reference, make a CSV based on values from your multi-world reasoning.\n{}",
        SEPARATOR, REFERENCE_CSV
    );
    let order = format!(
        "{sep}\nYou order the 9 estimates from low to high because you know that these values represent a reasonable range of outcomes.\n\n{sep}\nWith those values in mind, you are careful to use the units for answer",
        sep = SEPARATOR
    );
    let answer_lines: Vec<String> = REQUESTED_PERCENTILES
        .iter()
        .map(|p| format!("Percentile {}: XX", p))
        .collect();
    let answer = format!(
        "{}\nThe last thing you write is your final answer as:\n\"\n{}\n\"",
        SEPARATOR,
        answer_lines.join("\n")
    );

    assemble(&[
        ROLE,
        &question_header(d),
        &background,
        &d.resolution_criteria,
        &d.fine_print,
        &units,
        &research_block(research),
        &date_stamp(today),
        &bounds,
        formatting,
        before,
        &buckets,
        &verify,
        &worlds,
        &csv,
        &order,
        &answer,
    ])
}
