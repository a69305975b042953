//! English replies.

use super::{CollegeList, LanguageReplies, Prompts, Replies};
use crate::template::{Template, join};

pub(super) fn replies() -> Replies {
    Replies {
        greeting: "Hello! Welcome to DUCSS Panel, University of Delhi!\n\n\
                   Here you can stay updated with all events around you!",
        welcome_back: Template::new().text("Hi ").arg(0).text("! Welcome back!"),
        about: "DUCSS Panel Bot, for all your event needs, and more!\n\n\
                Copyright (C) The DUCS Developers, 2022",
        prompt: Prompts {
            name: "Your good name?",
            college: Template::new()
                .text("Hi ")
                .arg(0)
                .text(", which college are you from? Let us know using the list below!"),
            college_name: "Not from the colleges from that list? No worries! \
                           Let us know the name of your college.",
            error: "That doesn't seem right. Let's try again.",
        },
        college: CollegeList {
            title: "College Selection",
            description: "Select the college you are from, by specifying one of the options \
                          from the list below. In case your college is not listed, kindly \
                          select 'Other' and write your college name.",
            button_text: "View College List",
            section_title: "Colleges",
        },
        describe_user: join([
            Template::new().text("Here's what we recorded so far:\n\n"),
            Template::new()
                .text("Name: ")
                .named("name")
                .text("\nCollege: ")
                .named("college")
                .text("\nLanguage: ")
                .named("lang"),
        ]),
        lang: LanguageReplies {
            no_such_lang: Template::new()
                .text("Sorry, there is no language '")
                .arg(0)
                .text("'. Available languages: ")
                .arg(1)
                .text("."),
            changed: Template::new().text("Language changed to ").arg(0).text("."),
        },
    }
}
