//! Article generation prompt

const TEMPLATE: &str = "You are an expert article writer. Generate a well-structured article based on the provided title.
Use the following similar articles as reference to match the style, tone, and format, but create original content.

REFERENCE ARTICLES:
{context}

TITLE TO GENERATE ARTICLE FOR:
{input}

Write a comprehensive, engaging, and well-structured article for the given title.
The article should be factually accurate, well-researched, and follow a logical flow.
Include an introduction, several body paragraphs with relevant subheadings, and a conclusion.
Aim for approximately 800-1000 words.
Do not mention that you're using reference articles - write as if you are the original author.";

/// Fill the template with the retrieved context and the requested title
pub fn render(context: &str, title: &str) -> String {
    // Context is substituted last so placeholders inside reference text stay literal
    TEMPLATE
        .replacen("{input}", title, 1)
        .replacen("{context}", context, 1)
}
